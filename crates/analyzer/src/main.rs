//! Threat Analyzer - LLM-backed log enrichment pipeline
//!
//! This binary polls the log index for unprocessed entries, classifies each
//! one through a local inference service, and writes structured threat
//! verdicts back to a dedicated index.

use analyzer_lib::{
    health::{components, HealthRegistry},
    inference::OllamaClient,
    observability::{AnalyzerMetrics, StructuredLogger},
    pipeline::PipelineRunner,
    store::EsStore,
};
use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const ANALYZER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting threat-analyzer");

    // Load configuration
    let config = config::AnalyzerConfig::load()?;
    info!(
        store = %config.elasticsearch_url,
        inference = %config.ollama_url,
        model = %config.model,
        "Analyzer configured"
    );

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register(components::STORE).await;
    health_registry.register(components::INFERENCE).await;
    health_registry.register(components::PIPELINE).await;

    // Initialize metrics and structured logger
    let metrics = AnalyzerMetrics::new();
    let logger = StructuredLogger::new(&config.source_tag);
    logger.log_startup(ANALYZER_VERSION, &config.model);

    // Connect to the index store with bounded retry; exhausting the attempts
    // is the only fatal error path
    let store = EsStore::new(config.store_config())?;
    wait_for_store(&store, config.startup_attempts, config.startup_retry_secs).await?;
    info!("Connected to index store");

    // Provision the threat index before the first cycle
    store.ensure_threat_index().await?;

    let inference = OllamaClient::new(config.inference_config())?;

    // Create shared application state and start the health/metrics server
    let app_state = Arc::new(api::AppState::new(health_registry.clone(), metrics.clone()));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Start the analysis pipeline
    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let runner = PipelineRunner::new(
        Arc::new(store),
        Arc::new(inference),
        health_registry.clone(),
        config.pipeline_config(),
    );
    let pipeline_handle = tokio::spawn(runner.run(shutdown_rx));

    // Mark analyzer as ready after initialization
    health_registry.set_ready(true).await;

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    let _ = shutdown_tx.send(());

    // Let the in-flight cycle finish before exiting
    let _ = pipeline_handle.await;
    api_handle.abort();
    info!("Shut down cleanly");

    Ok(())
}

/// Probe store connectivity with a bounded number of attempts
async fn wait_for_store(store: &EsStore, attempts: u32, retry_secs: u64) -> Result<()> {
    for attempt in 1..=attempts {
        match store.ping().await {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!(
                    attempt,
                    attempts,
                    error = %e,
                    "Index store not ready"
                );
                if attempt < attempts {
                    tokio::time::sleep(Duration::from_secs(retry_secs)).await;
                }
            }
        }
    }

    bail!(
        "failed to connect to index store at {} after {} attempts",
        store.endpoint(),
        attempts
    )
}
