mod assist;
mod config;
mod error;
mod generation;
mod models;
mod placeholder;
mod prompts;
mod queue;
mod routes;
mod settings;
mod upstream;
#[cfg(test)]
mod testing;

use std::net::SocketAddr;
use std::sync::Arc;
use anyhow::Context;
use tracing_subscriber::{fmt, EnvFilter};

use crate::{
    assist::TextAssistGateway,
    config::AppConfig,
    generation::GenerationGateway,
    queue::{QueueConfig, QueueProcessor},
    routes::{router, AppState},
    settings::SettingsStore,
    upstream::{mask_credential, OpenAiClient, Upstream},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = AppConfig::from_env()?;
    let settings = SettingsStore::load(&config.settings_path)
        .with_context(|| format!("loading settings from {}", config.settings_path.display()))?;
    if let (None, Some(key)) = (settings.credential(), config.initial_api_key.as_deref()) {
        tracing::info!("Seeding stored API key from environment: {}", mask_credential(key));
        settings.set_credential(key).context("persisting initial API key")?;
    }

    let upstream: Arc<dyn Upstream> = Arc::new(OpenAiClient::new(
        config.upstream_base.clone(),
        config.image_model.clone(),
        config.chat_model.clone(),
    ));
    let generation = Arc::new(GenerationGateway::new(upstream.clone()));
    let state = AppState {
        generation: generation.clone(),
        assist: Arc::new(TextAssistGateway::new(upstream)),
        queue: Arc::new(QueueProcessor::new(
            generation,
            QueueConfig::builder().with_group_delay(config.group_delay).build(),
        )),
        settings: Arc::new(settings),
    };

    let app = router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, upstream = %config.upstream_base, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
