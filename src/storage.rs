use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::StorageError;
use crate::session::{Message, NewMessage, Session, SessionRecord};

/// sessionId-keyed message transcripts, the second persisted aggregate.
pub type Transcripts = HashMap<String, Vec<Message>>;

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create_session(&self) -> Result<SessionRecord, StorageError>;
    /// Appends with a store-assigned id and timestamp and returns the full
    /// updated transcript. Appending to a session that was never explicitly
    /// created is tolerated: the transcript and index entry are initialized
    /// on the spot.
    async fn append_message(
        &self,
        session_id: &str,
        msg: NewMessage,
    ) -> Result<Vec<Message>, StorageError>;
    /// `None` when no index entry exists, even if an orphan transcript does.
    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, StorageError>;
    /// Index insertion order.
    async fn list_sessions(&self) -> Result<Vec<SessionRecord>, StorageError>;
    /// Consistent read of both aggregates, for the analytics scans.
    async fn snapshot(&self) -> Result<(Vec<SessionRecord>, Transcripts), StorageError>;
}

/// Flat-file store: a session index array in `sessions.json` and a
/// sessionId-keyed transcript map in `chats.json`. Every mutation is a full
/// read-modify-write of both files, serialized by one in-process mutex so
/// concurrent requests cannot drop each other's updates. Unreadable or
/// corrupt files are logged and read as empty rather than failing requests.
pub struct JsonSessionRepository {
    index_path: PathBuf,
    chats_path: PathBuf,
    lock: Mutex<()>,
    next_id: AtomicI64,
}

impl JsonSessionRepository {
    pub fn new(data_dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;
        Ok(Self {
            index_path: data_dir.join("sessions.json"),
            chats_path: data_dir.join("chats.json"),
            lock: Mutex::new(()),
            // Seeded from the clock once so restarts keep ids roughly
            // increasing; rapid appends within a process cannot collide.
            next_id: AtomicI64::new(Utc::now().timestamp_millis()),
        })
    }

    fn next_message_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn load_index(&self) -> Vec<SessionRecord> {
        load_or_default(&self.index_path)
    }

    fn load_chats(&self) -> Transcripts {
        load_or_default(&self.chats_path)
    }

    fn save_index(&self, records: &[SessionRecord]) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(records)?;
        std::fs::write(&self.index_path, json)?;
        Ok(())
    }

    fn save_chats(&self, chats: &Transcripts) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(chats)?;
        std::fs::write(&self.chats_path, json)?;
        Ok(())
    }
}

fn load_or_default<T: serde::de::DeserializeOwned + Default>(path: &Path) -> T {
    if !path.exists() {
        return T::default();
    }
    match std::fs::read_to_string(path) {
        Ok(data) => match serde_json::from_str(&data) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "unparseable aggregate, treating as empty");
                T::default()
            }
        },
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "unreadable aggregate, treating as empty");
            T::default()
        }
    }
}

#[async_trait]
impl SessionRepository for JsonSessionRepository {
    async fn create_session(&self) -> Result<SessionRecord, StorageError> {
        let _guard = self.lock.lock().await;
        let mut records = self.load_index();
        let mut chats = self.load_chats();

        let now = Utc::now();
        let record = SessionRecord {
            session_id: Uuid::new_v4().to_string(),
            created_time: now,
            last_chat_time: now,
        };
        records.push(record.clone());
        chats.insert(record.session_id.clone(), Vec::new());

        self.save_index(&records)?;
        self.save_chats(&chats)?;
        tracing::info!(session_id = %record.session_id, "session created");
        Ok(record)
    }

    async fn append_message(
        &self,
        session_id: &str,
        msg: NewMessage,
    ) -> Result<Vec<Message>, StorageError> {
        let _guard = self.lock.lock().await;
        let mut records = self.load_index();
        let mut chats = self.load_chats();

        let now = Utc::now();
        let stored = Message {
            id: self.next_message_id(),
            text: msg.text,
            sender: msg.sender,
            timestamp: now,
            confidence: msg.confidence,
        };
        tracing::debug!(
            session_id,
            sender = stored.sender.as_str(),
            "storing message"
        );

        let transcript = chats.entry(session_id.to_string()).or_default();
        transcript.push(stored);
        let transcript = transcript.clone();

        match records.iter_mut().find(|r| r.session_id == session_id) {
            Some(record) => record.last_chat_time = now,
            None => records.push(SessionRecord {
                session_id: session_id.to_string(),
                created_time: now,
                last_chat_time: now,
            }),
        }

        self.save_index(&records)?;
        self.save_chats(&chats)?;
        Ok(transcript)
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, StorageError> {
        let _guard = self.lock.lock().await;
        let records = self.load_index();
        let Some(record) = records.into_iter().find(|r| r.session_id == session_id) else {
            return Ok(None);
        };
        let mut chats = self.load_chats();
        let messages = chats.remove(session_id).unwrap_or_default();
        Ok(Some(Session::new(record, messages)))
    }

    async fn list_sessions(&self) -> Result<Vec<SessionRecord>, StorageError> {
        let _guard = self.lock.lock().await;
        Ok(self.load_index())
    }

    async fn snapshot(&self) -> Result<(Vec<SessionRecord>, Transcripts), StorageError> {
        let _guard = self.lock.lock().await;
        Ok((self.load_index(), self.load_chats()))
    }
}
