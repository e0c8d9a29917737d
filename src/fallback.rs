/// Confidence attached to a keyword-matched canned reply.
pub const TRIGGER_CONFIDENCE: f64 = 0.7;
/// Confidence attached to the generic clarification reply.
pub const DEFAULT_CONFIDENCE: f64 = 0.3;

#[derive(Debug, Clone)]
pub struct FallbackReply {
    pub text: String,
    pub confidence: f64,
}

#[derive(Debug, Clone)]
struct Trigger {
    keyword: &'static str,
    reply: &'static str,
}

/// Canned replies used when the completion API is unavailable. Triggers are
/// evaluated in declaration order against the lowercased, trimmed input;
/// the first substring hit wins, so the same input always yields the same
/// reply.
#[derive(Debug, Clone)]
pub struct FallbackResponder {
    triggers: Vec<Trigger>,
    default_reply: &'static str,
}

impl Default for FallbackResponder {
    fn default() -> Self {
        Self {
            triggers: vec![
                Trigger {
                    keyword: "hello",
                    reply: "Hello! I'm Sarah from SolarMax Solutions. I'm here to help you learn about solar energy and see if it's right for your home or business. What questions do you have about going solar?",
                },
                Trigger {
                    keyword: "hi",
                    reply: "Hi there! I'm excited to help you explore solar energy options. Are you looking to reduce your electricity bills or learn more about renewable energy?",
                },
                Trigger {
                    keyword: "help",
                    reply: "I'd be happy to help! I can answer questions about solar panels, financing options, installation process, savings potential, or any other solar-related topics. What would you like to know?",
                },
                Trigger {
                    keyword: "cost",
                    reply: "Great question! Solar costs have dropped significantly in recent years. The average residential system costs $15,000-$25,000 before incentives, but with the 30% federal tax credit and other incentives, your out-of-pocket cost is much lower. Would you like me to explain the financing options?",
                },
                Trigger {
                    keyword: "savings",
                    reply: "Solar can save you thousands over the system's lifetime! Most homeowners see 50-90% reduction in their electricity bills. On average, customers save $1,000-$3,000 annually. Would you like me to calculate potential savings for your specific situation?",
                },
                Trigger {
                    keyword: "thanks",
                    reply: "You're very welcome! I'm passionate about helping people make the switch to clean energy. Is there anything else about solar that you'd like to explore?",
                },
                Trigger {
                    keyword: "goodbye",
                    reply: "Thank you for your time! If you're interested in learning more, I'd love to schedule a free consultation to assess your home's solar potential. Have a great day!",
                },
            ],
            default_reply: "I'm sorry, I'm having trouble connecting to my AI system right now. I'm Sarah from SolarMax Solutions, and I'd love to help you with any solar energy questions. Could you try asking again or let me know what specific information you're looking for?",
        }
    }
}

impl FallbackResponder {
    pub fn respond(&self, user_message: &str) -> FallbackReply {
        let normalized = user_message.to_lowercase();
        let normalized = normalized.trim();
        for trigger in &self.triggers {
            if normalized.contains(trigger.keyword) {
                return FallbackReply {
                    text: trigger.reply.to_string(),
                    confidence: TRIGGER_CONFIDENCE,
                };
            }
        }
        FallbackReply {
            text: self.default_reply.to_string(),
            confidence: DEFAULT_CONFIDENCE,
        }
    }
}
