use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
    Admin,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Bot => "bot",
            Sender::Admin => "admin",
        }
    }
}

/// One entry in a session transcript. `confidence` is only present on
/// bot-authored messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub text: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Payload for an append; the store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub text: String,
    pub sender: Sender,
    pub confidence: Option<f64>,
}

/// Index entry for one session. Invariant: `last_chat_time >= created_time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    pub created_time: DateTime<Utc>,
    pub last_chat_time: DateTime<Utc>,
}

/// A session record joined with its transcript, as returned to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub created_time: DateTime<Utc>,
    pub last_chat_time: DateTime<Utc>,
    pub messages: Vec<Message>,
}

impl Session {
    pub fn new(record: SessionRecord, messages: Vec<Message>) -> Self {
        Self {
            session_id: record.session_id,
            created_time: record.created_time,
            last_chat_time: record.last_chat_time,
            messages,
        }
    }
}
