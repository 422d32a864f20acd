use cfo_assistant::{agents::Assistant, api::start_server, config::Settings, Result};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let result = serve().await;
    if let Err(e) = &result {
        error!("API server stopped: {}", e);
    }
    result
}

async fn serve() -> Result<()> {
    let settings = Settings::from_env()?;
    settings.require_api_key()?;

    info!("🚀 CFO Assistant - API Server");
    info!("📍 Port: {}", settings.api_port);

    let assistant = Arc::new(Assistant::from_settings(&settings).await?);
    info!("✅ Assistant initialized");

    start_server(assistant, settings.document_dir.clone(), settings.api_port).await
}
