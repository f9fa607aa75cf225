pub mod api; // HTTP surface: admin + student routes
pub mod blob_store; // Content-addressed storage for uploaded PDFs
pub mod config;
pub mod core_state; // Transport-agnostic shared state
pub mod db;
pub mod export; // Printable practice papers
pub mod models;
pub mod pipeline;
pub mod pipeline_config;

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::api::start_api_server;
use crate::core_state::CoreState;
use crate::pipeline_config::PipelineConfig;

/// Boot the service and serve until Ctrl-C.
pub async fn run() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("Paperloom starting v{}", config::APP_VERSION);

    let pipeline_config =
        PipelineConfig::load(&config::config_path()).map_err(|e| format!("Invalid configuration: {e}"))?;
    let core = CoreState::open(&config::database_path(), &config::blobs_dir(), pipeline_config)
        .map_err(|e| format!("Failed to open data directory: {e}"))?;

    let mut server = start_api_server(Arc::new(core), &config::bind_addr()).await?;
    tracing::info!(addr = %server.addr, "Paperloom ready");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    server.shutdown();
    server.wait().await;
    Ok(())
}
