//! Translation worker
//!
//! Consumes translation requests from the shared queue one at a time and
//! replies to each caller's private queue.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use babel_chat::config::Settings;
use babel_chat::infrastructure::broker::open_broker;
use babel_chat::infrastructure::rpc::{OllamaEngine, TranslationWorker, WorkerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    babel_chat::telemetry::init_tracing(json_logs);

    let settings = Settings::load()?;
    let config = WorkerConfig::from(&settings);
    info!(
        broker = %settings.broker.url,
        queue = %config.request_queue,
        consumer_tag = %config.consumer_tag,
        engine = %settings.worker.engine_url,
        model = %settings.worker.model,
        "Starting translation worker"
    );

    let broker = open_broker(&settings.broker).context("failed to open message broker")?;
    let engine = Arc::new(OllamaEngine::new(&settings.worker).context("failed to build engine client")?);
    let worker = TranslationWorker::new(broker, engine, config);

    worker
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
        })
        .await
        .context("translation worker stopped")?;

    info!("Translation worker stopped");
    Ok(())
}
