//! # Babel Chat
//!
//! Server entry point: tracing, configuration, database, broker link and
//! the HTTP/WebSocket server.

use anyhow::Result;
use tracing::info;

use babel_chat::config::Settings;
use babel_chat::startup::Application;

#[tokio::main]
async fn main() -> Result<()> {
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    babel_chat::telemetry::init_tracing(json_logs);

    info!("Starting Babel Chat...");

    let settings = Settings::load()?;
    info!(
        host = %settings.server.host,
        port = %settings.server.port,
        environment = %settings.environment,
        broker = %settings.broker.url,
        "Configuration loaded"
    );

    let application = Application::build(settings).await?;

    info!("Server ready to accept connections");
    application.run_until_stopped().await?;

    Ok(())
}
