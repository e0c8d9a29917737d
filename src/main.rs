use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

mod analytics;
mod chat;
mod error;
mod fallback;
mod models;
mod server;
mod session;
mod settings;
mod storage;

#[derive(Debug, Parser)]
#[command(name = "solarbot")]
#[command(about = "Chat backend with session persistence and analytics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Start {
        #[arg(long, default_value = "127.0.0.1:5111")]
        listen: String,
        #[arg(long, default_value = "data")]
        data_dir: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Start { listen, data_dir } => {
            let settings = settings::Settings::resolve(&listen, &data_dir)?;
            let repo: Arc<dyn storage::SessionRepository> =
                Arc::new(storage::JsonSessionRepository::new(&settings.data_dir)?);
            let model = Arc::new(models::OpenAiCompatible::new(
                settings.model.base_url.clone(),
                settings.model.api_key.clone(),
                settings.model.request_timeout,
            )?);
            let chat = Arc::new(chat::ChatService::new(
                model,
                fallback::FallbackResponder::default(),
                settings.system_prompt.clone(),
                settings.sampling_params(),
            ));
            let state = server::AppState { repo, chat };
            server::serve(settings.listen, state).await?;
        }
    }
    Ok(())
}
