use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::analytics;
use crate::chat::ChatService;
use crate::error::ApiError;
use crate::session::{Message, NewMessage, Sender, SessionRecord};
use crate::storage::SessionRepository;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn SessionRepository>,
    pub chat: Arc<ChatService>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionResponse {
    session_id: String,
}

async fn create_session(
    State(state): State<AppState>,
) -> Result<Json<CreateSessionResponse>, ApiError> {
    let record = state.repo.create_session().await?;
    Ok(Json(CreateSessionResponse {
        session_id: record.session_id,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    // Kept as a raw value so a missing or non-string message maps to a 400
    // instead of a body-rejection.
    #[serde(default)]
    message: Value,
    session_id: Option<String>,
    sender_type: Option<Sender>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AdminAckResponse {
    success: bool,
    message: &'static str,
    admin_message: Message,
}

/// One chat turn. User turns get a generated reply (model, or canned
/// fallback when the model fails); any other sender type is stored verbatim
/// and acknowledged without touching the model. Without a sessionId nothing
/// is persisted but a reply is still produced.
async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let Some(text) = body.message.as_str() else {
        return Err(ApiError::validation(
            "Message is required and must be a string",
        ));
    };
    let sender = body.sender_type.unwrap_or(Sender::User);
    tracing::info!(
        sender = sender.as_str(),
        session_id = body.session_id.as_deref().unwrap_or("none"),
        "incoming chat message"
    );

    let now = Utc::now();
    let mut incoming = Message {
        id: now.timestamp_millis(),
        text: text.to_string(),
        sender,
        timestamp: now,
        confidence: None,
    };
    // History replayed to the model is the transcript before this turn.
    let mut history: Vec<Message> = Vec::new();
    if let Some(session_id) = &body.session_id {
        let transcript = state
            .repo
            .append_message(
                session_id,
                NewMessage {
                    text: text.to_string(),
                    sender,
                    confidence: None,
                },
            )
            .await?;
        if let Some((last, rest)) = transcript.split_last() {
            incoming = last.clone();
            history = rest.to_vec();
        }
    }

    if sender != Sender::User {
        return Ok(Json(AdminAckResponse {
            success: true,
            message: "Admin message sent successfully",
            admin_message: incoming,
        })
        .into_response());
    }

    let reply = state.chat.respond(text, &history).await;
    let bot_message = match &body.session_id {
        Some(session_id) => {
            let transcript = state
                .repo
                .append_message(
                    session_id,
                    NewMessage {
                        text: reply.text.clone(),
                        sender: Sender::Bot,
                        confidence: Some(reply.confidence),
                    },
                )
                .await?;
            transcript
                .last()
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("append returned empty transcript"))
                .map_err(ApiError::Internal)?
        }
        None => Message {
            id: Utc::now().timestamp_millis(),
            text: reply.text,
            sender: Sender::Bot,
            timestamp: Utc::now(),
            confidence: Some(reply.confidence),
        },
    };
    Ok(Json(bot_message).into_response())
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Response, ApiError> {
    let session = state
        .repo
        .get_session(&session_id)
        .await?
        .ok_or(ApiError::NotFound("Session"))?;
    Ok(Json(session).into_response())
}

async fn list_sessions(State(state): State<AppState>) -> Result<Json<Vec<SessionRecord>>, ApiError> {
    Ok(Json(state.repo.list_sessions().await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminReplyRequest {
    #[serde(default)]
    message: Value,
    session_id: Option<String>,
}

/// Stores an operator reply into a transcript and echoes it back. Never
/// generates.
async fn admin_reply(
    State(state): State<AppState>,
    Json(body): Json<AdminReplyRequest>,
) -> Result<Json<AdminAckResponse>, ApiError> {
    let Some(text) = body.message.as_str() else {
        return Err(ApiError::validation(
            "Message is required and must be a string",
        ));
    };
    let Some(session_id) = body.session_id else {
        return Err(ApiError::validation("Session ID is required"));
    };
    tracing::info!(session_id = %session_id, "admin reply");

    let transcript = state
        .repo
        .append_message(
            &session_id,
            NewMessage {
                text: text.to_string(),
                sender: Sender::Admin,
                confidence: None,
            },
        )
        .await?;
    let admin_message = transcript
        .last()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("append returned empty transcript"))
        .map_err(ApiError::Internal)?;
    Ok(Json(AdminAckResponse {
        success: true,
        message: "Admin reply sent successfully",
        admin_message,
    }))
}

async fn get_analytics(
    State(state): State<AppState>,
) -> Result<Json<analytics::AnalyticsReport>, ApiError> {
    let (records, transcripts) = state.repo.snapshot().await?;
    Ok(Json(analytics::overview(&records, &transcripts, Utc::now())))
}

async fn get_chat_stats(
    State(state): State<AppState>,
) -> Result<Json<analytics::ChatStatsReport>, ApiError> {
    let (records, transcripts) = state.repo.snapshot().await?;
    Ok(Json(analytics::chat_stats(
        &records,
        &transcripts,
        Utc::now(),
    )))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "OK",
        "message": "Chatbot API is running",
        "timestamp": Utc::now(),
    }))
}

async fn index() -> Json<Value> {
    Json(json!({
        "message": "Chatbot Backend API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "POST /api/chat": "Send a message to get a response (supports senderType: user/admin)",
            "POST /api/session": "Create a new chat session",
            "GET /api/session/:sessionId": "Get session data and chat history",
            "GET /api/sessions": "Get all sessions",
            "POST /api/admin/reply": "Send admin reply to user (no generated response)",
            "GET /api/analytics": "Get analytics data for admin dashboard",
            "GET /api/chat-stats": "Get detailed chat statistics",
            "GET /api/health": "Check API health status",
        }
    }))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/health", get(health))
        .route("/api/session", post(create_session))
        .route("/api/session/:session_id", get(get_session))
        .route("/api/sessions", get(list_sessions))
        .route("/api/chat", post(chat))
        .route("/api/admin/reply", post(admin_reply))
        .route("/api/analytics", get(get_analytics))
        .route("/api/chat-stats", get(get_chat_stats))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "chat backend listening");
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::FallbackResponder;
    use crate::models::{CompletionModel, PromptMessage, SamplingParams};
    use crate::storage::JsonSessionRepository;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct StubModel {
        reply: Option<&'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CompletionModel for StubModel {
        async fn complete(
            &self,
            _messages: &[PromptMessage],
            _params: &SamplingParams,
        ) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.reply {
                Some(text) => Ok(text.to_string()),
                None => anyhow::bail!("upstream unavailable"),
            }
        }
    }

    async fn spawn_server(
        reply: Option<&'static str>,
    ) -> (String, Arc<StubModel>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let repo = Arc::new(JsonSessionRepository::new(dir.path()).unwrap());
        let model = Arc::new(StubModel {
            reply,
            calls: AtomicUsize::new(0),
        });
        let chat = Arc::new(ChatService::new(
            model.clone(),
            FallbackResponder::default(),
            "Be brief.".into(),
            SamplingParams {
                model: "test-model".into(),
                temperature: 0.7,
                max_tokens: 100,
            },
        ));
        let state = AppState { repo, chat };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        (format!("http://{addr}"), model, dir)
    }

    #[tokio::test]
    async fn full_conversation_roundtrip() {
        let (base, model, _dir) = spawn_server(Some("Hi! How can I help?")).await;
        let client = reqwest::Client::new();

        let created: Value = client
            .post(format!("{base}/api/session"))
            .json(&json!({}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let session_id = created["sessionId"].as_str().unwrap().to_string();

        let bot: Value = client
            .post(format!("{base}/api/chat"))
            .json(&json!({"message": "Hello", "sessionId": session_id}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(bot["sender"], "bot");
        assert_eq!(bot["text"], "Hi! How can I help?");
        assert_eq!(bot["confidence"], 0.9);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);

        let session: Value = client
            .get(format!("{base}/api/session/{session_id}"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let messages = session["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["sender"], "user");
        assert_eq!(messages[0]["text"], "Hello");
        assert_eq!(messages[1]["sender"], "bot");
        assert_eq!(messages[1]["text"], "Hi! How can I help?");
    }

    #[tokio::test]
    async fn chat_without_session_still_replies() {
        let (base, _model, _dir) = spawn_server(Some("stateless reply")).await;
        let client = reqwest::Client::new();

        let bot: Value = client
            .post(format!("{base}/api/chat"))
            .json(&json!({"message": "Hello"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(bot["text"], "stateless reply");

        let sessions: Value = client
            .get(format!("{base}/api/sessions"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(sessions.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn upstream_failure_answers_from_fallback() {
        let (base, model, _dir) = spawn_server(None).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{base}/api/chat"))
            .json(&json!({"message": "hello there"}))
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success());
        let bot: Value = resp.json().await.unwrap();
        assert!(bot["text"].as_str().unwrap().starts_with("Hello! I'm Sarah"));
        assert_eq!(bot["confidence"], 0.7);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn admin_sender_never_invokes_the_model() {
        let (base, model, _dir) = spawn_server(Some("should not appear")).await;
        let client = reqwest::Client::new();

        let created: Value = client
            .post(format!("{base}/api/session"))
            .json(&json!({}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let session_id = created["sessionId"].as_str().unwrap();

        let ack: Value = client
            .post(format!("{base}/api/chat"))
            .json(&json!({"message": "note", "sessionId": session_id, "senderType": "admin"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(ack["success"], true);
        assert_eq!(ack["adminMessage"]["sender"], "admin");
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn chat_rejects_missing_or_non_string_message() {
        let (base, _model, _dir) = spawn_server(Some("x")).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{base}/api/chat"))
            .json(&json!({"sessionId": "abc"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 400);

        let resp = client
            .post(format!("{base}/api/chat"))
            .json(&json!({"message": 42}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 400);
    }

    #[tokio::test]
    async fn admin_reply_requires_session_id_and_stores_message() {
        let (base, _model, _dir) = spawn_server(Some("x")).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{base}/api/admin/reply"))
            .json(&json!({"message": "hi"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 400);

        let created: Value = client
            .post(format!("{base}/api/session"))
            .json(&json!({}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let session_id = created["sessionId"].as_str().unwrap();

        let ack: Value = client
            .post(format!("{base}/api/admin/reply"))
            .json(&json!({"message": "we will call you", "sessionId": session_id}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(ack["success"], true);
        assert_eq!(ack["adminMessage"]["text"], "we will call you");

        let session: Value = client
            .get(format!("{base}/api/session/{session_id}"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(session["messages"][0]["sender"], "admin");
    }

    #[tokio::test]
    async fn unknown_session_is_404() {
        let (base, _model, _dir) = spawn_server(Some("x")).await;
        let resp = reqwest::get(format!("{base}/api/session/nope"))
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 404);
    }

    #[tokio::test]
    async fn analytics_on_empty_store() {
        let (base, _model, _dir) = spawn_server(Some("x")).await;

        let report: Value = reqwest::get(format!("{base}/api/analytics"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(report["totalSessions"], 0);
        assert_eq!(report["totalMessages"], 0);
        assert_eq!(report["conversionRate"], 0.0);

        let stats: Value = reqwest::get(format!("{base}/api/chat-stats"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(stats["totalMessages"], 0);
        assert_eq!(stats["avgResponseTimeSeconds"], 0.0);
    }

    #[tokio::test]
    async fn analytics_reflect_conversation() {
        let (base, _model, _dir) = spawn_server(Some("answer")).await;
        let client = reqwest::Client::new();

        let created: Value = client
            .post(format!("{base}/api/session"))
            .json(&json!({}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let session_id = created["sessionId"].as_str().unwrap();
        client
            .post(format!("{base}/api/chat"))
            .json(&json!({"message": "pricing please", "sessionId": session_id}))
            .send()
            .await
            .unwrap();

        let report: Value = reqwest::get(format!("{base}/api/analytics"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(report["totalSessions"], 1);
        assert_eq!(report["totalMessages"], 2);
        assert_eq!(report["recurringUsers"], 1);
        assert_eq!(report["recentActivity"]["sessions"], 1);

        let stats: Value = reqwest::get(format!("{base}/api/chat-stats"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(stats["userMessages"], 1);
        assert_eq!(stats["botMessages"], 1);
        assert_eq!(stats["sessionsWithMessages"], 1);
        assert_eq!(stats["topUserMessages"][0]["text"], "pricing please");
    }

    #[tokio::test]
    async fn health_and_index() {
        let (base, _model, _dir) = spawn_server(Some("x")).await;

        let health: Value = reqwest::get(format!("{base}/api/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "OK");

        let catalog: Value = reqwest::get(format!("{base}/")).await.unwrap().json().await.unwrap();
        assert!(catalog["endpoints"].is_object());
    }
}
