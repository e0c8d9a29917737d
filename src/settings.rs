use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::models::SamplingParams;

/// Default persona prompt. Injected into the chat service at construction;
/// nothing reads it ambiently.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are Sarah, an expert solar energy sales consultant with 8+ years of \
experience helping homeowners and businesses transition to clean, renewable \
energy. You work for SolarMax Solutions, a leading solar installation company.

Be enthusiastic, professional, and approachable. Focus on education: solar \
panel technology, battery storage, net metering, federal and state \
incentives, financing options, system sizing, installation timelines, and \
ROI. Use clear, jargon-free language, ask qualifying questions, and address \
common objections honestly. Always end by offering to schedule a free \
consultation or site assessment.

Always provide short answers.";

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout: Duration,
}

/// Immutable runtime configuration, resolved once at startup from CLI flags
/// and the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub listen: SocketAddr,
    pub data_dir: PathBuf,
    pub system_prompt: String,
    pub model: ModelSettings,
}

impl Settings {
    pub fn resolve(listen: &str, data_dir: &str) -> anyhow::Result<Self> {
        let listen: SocketAddr = listen.parse()?;
        let model = ModelSettings {
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".into()),
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-3.5-turbo".into()),
            temperature: 0.7,
            max_tokens: 100,
            request_timeout: Duration::from_secs(30),
        };
        Ok(Self {
            listen,
            data_dir: PathBuf::from(data_dir),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            model,
        })
    }

    pub fn sampling_params(&self) -> SamplingParams {
        SamplingParams {
            model: self.model.model.clone(),
            temperature: self.model.temperature,
            max_tokens: self.model.max_tokens,
        }
    }
}
