use std::sync::Arc;

use crate::fallback::FallbackResponder;
use crate::models::{CompletionModel, PromptMessage, PromptRole, SamplingParams};
use crate::session::{Message, Sender};

/// Confidence attached to a reply that came from the model.
const MODEL_CONFIDENCE: f64 = 0.9;

#[derive(Debug, Clone)]
pub struct BotReply {
    pub text: String,
    pub confidence: f64,
}

/// Turns a user message plus stored history into a reply. One completion
/// attempt per turn; any failure is logged and answered from the canned
/// fallback table, so a reply is always produced.
pub struct ChatService {
    model: Arc<dyn CompletionModel>,
    fallback: FallbackResponder,
    system_prompt: String,
    params: SamplingParams,
}

impl ChatService {
    pub fn new(
        model: Arc<dyn CompletionModel>,
        fallback: FallbackResponder,
        system_prompt: String,
        params: SamplingParams,
    ) -> Self {
        Self {
            model,
            fallback,
            system_prompt,
            params,
        }
    }

    pub async fn respond(&self, user_message: &str, history: &[Message]) -> BotReply {
        let prompt = build_prompt(&self.system_prompt, history, user_message);
        tracing::debug!(context_len = prompt.len(), "requesting completion");
        match self.model.complete(&prompt, &self.params).await {
            Ok(text) => BotReply {
                text,
                confidence: MODEL_CONFIDENCE,
            },
            Err(err) => {
                tracing::warn!(error = %err, "completion failed, answering from fallback table");
                let reply = self.fallback.respond(user_message);
                BotReply {
                    text: reply.text,
                    confidence: reply.confidence,
                }
            }
        }
    }
}

/// System prompt, then the stored history (admin turns are operator-to-user
/// traffic and must not steer the model), then the current user turn.
fn build_prompt(system_prompt: &str, history: &[Message], user_message: &str) -> Vec<PromptMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(PromptMessage::new(PromptRole::System, system_prompt));
    for msg in history {
        match msg.sender {
            Sender::User => messages.push(PromptMessage::new(PromptRole::User, msg.text.clone())),
            Sender::Bot => {
                messages.push(PromptMessage::new(PromptRole::Assistant, msg.text.clone()))
            }
            Sender::Admin => {}
        }
    }
    messages.push(PromptMessage::new(PromptRole::User, user_message));
    messages
}
