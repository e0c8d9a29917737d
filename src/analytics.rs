use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::session::{Sender, SessionRecord};
use crate::storage::Transcripts;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentActivity {
    pub sessions: usize,
    pub messages: usize,
}

/// Dashboard overview, recomputed from a full store scan on every call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub total_sessions: usize,
    pub total_messages: usize,
    pub recurring_users: usize,
    pub avg_messages_per_session: f64,
    pub conversion_rate: f64,
    pub recent_activity: RecentActivity,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopMessage {
    pub text: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatStatsReport {
    pub total_messages: usize,
    pub user_messages: usize,
    pub bot_messages: usize,
    pub avg_response_time_seconds: f64,
    pub top_user_messages: Vec<TopMessage>,
    pub sessions_with_messages: usize,
    pub last_updated: DateTime<Utc>,
}

/// Session/message counts, recurrence, and the trailing-24h activity window
/// relative to `now`. Division-by-zero cases are defined as 0, never NaN.
pub fn overview(
    records: &[SessionRecord],
    transcripts: &Transcripts,
    now: DateTime<Utc>,
) -> AnalyticsReport {
    let total_sessions = records.len();
    let total_messages: usize = transcripts.values().map(Vec::len).sum();
    let recurring_users = records
        .iter()
        .filter(|r| r.last_chat_time > r.created_time)
        .count();

    let avg_messages_per_session = if total_sessions > 0 {
        round2(total_messages as f64 / total_sessions as f64)
    } else {
        0.0
    };
    let conversion_rate = if total_sessions > 0 {
        round1(recurring_users as f64 / total_sessions as f64 * 100.0)
    } else {
        0.0
    };

    let cutoff = now - Duration::hours(24);
    let recent_sessions = records.iter().filter(|r| r.last_chat_time > cutoff).count();
    let recent_messages = transcripts
        .values()
        .flatten()
        .filter(|m| m.timestamp > cutoff)
        .count();

    AnalyticsReport {
        total_sessions,
        total_messages,
        recurring_users,
        avg_messages_per_session,
        conversion_rate,
        recent_activity: RecentActivity {
            sessions: recent_sessions,
            messages: recent_messages,
        },
        last_updated: now,
    }
}

/// Message-level statistics. Response-time pairs are matched within each
/// session's transcript: every adjacent user-then-bot pair contributes its
/// timestamp delta, averaged in whole seconds. Transcripts are visited in
/// index order so frequency ties keep first-seen order.
pub fn chat_stats(
    records: &[SessionRecord],
    transcripts: &Transcripts,
    now: DateTime<Utc>,
) -> ChatStatsReport {
    let mut total_messages = 0;
    let mut user_messages = 0;
    let mut bot_messages = 0;
    let mut response_ms: Vec<i64> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut first_seen: Vec<String> = Vec::new();

    for record in records {
        let Some(transcript) = transcripts.get(&record.session_id) else {
            continue;
        };
        total_messages += transcript.len();
        for msg in transcript {
            match msg.sender {
                Sender::User => {
                    user_messages += 1;
                    let text = msg.text.trim().to_lowercase();
                    if !text.is_empty() {
                        let count = counts.entry(text.clone()).or_insert(0);
                        if *count == 0 {
                            first_seen.push(text);
                        }
                        *count += 1;
                    }
                }
                Sender::Bot => bot_messages += 1,
                Sender::Admin => {}
            }
        }
        for pair in transcript.windows(2) {
            if pair[0].sender == Sender::User && pair[1].sender == Sender::Bot {
                response_ms.push((pair[1].timestamp - pair[0].timestamp).num_milliseconds());
            }
        }
    }

    let avg_response_time_seconds = if response_ms.is_empty() {
        0.0
    } else {
        let avg_ms = response_ms.iter().sum::<i64>() as f64 / response_ms.len() as f64;
        (avg_ms / 1000.0).round()
    };

    let mut top_user_messages: Vec<TopMessage> = first_seen
        .into_iter()
        .map(|text| {
            let count = counts[&text];
            TopMessage { text, count }
        })
        .collect();
    // Stable sort keeps first-seen order among equal counts.
    top_user_messages.sort_by(|a, b| b.count.cmp(&a.count));
    top_user_messages.truncate(5);

    let sessions_with_messages = transcripts.values().filter(|t| !t.is_empty()).count();

    ChatStatsReport {
        total_messages,
        user_messages,
        bot_messages,
        avg_response_time_seconds,
        top_user_messages,
        sessions_with_messages,
        last_updated: now,
    }
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
