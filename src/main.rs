//! pagesmith - HTTP Server Entry Point
//!
//! Starts the HTTP server that accepts task submissions.

use pagesmith::{api, config::Config};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pagesmith=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    info!(
        "Loaded configuration: model={}, backend={:?}, readme={:?}",
        config.llm.model, config.repo_backend, config.doc_style
    );
    if config.llm.api_key.is_none() {
        tracing::warn!("AI_API_KEY is not set; every generation will fail until it is");
    }

    api::serve(config).await?;

    Ok(())
}
