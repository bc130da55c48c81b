//! Application Startup
//!
//! Application building and server initialization.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::application::services::{ContactService, MessageRelay, RoomEmitter};
use crate::config::Settings;
use crate::domain::{ContactRepository, MessageRepository, UserRepository};
use crate::infrastructure::broker::{open_broker, Broker};
use crate::infrastructure::crypto::ContentCipher;
use crate::infrastructure::database;
use crate::infrastructure::repositories::{
    PgContactRepository, PgMessageRepository, PgUserRepository,
};
use crate::infrastructure::rpc::{OllamaEngine, TranslationClient, TranslationWorker, WorkerConfig};
use crate::presentation::http::{create_router, handlers::health};
use crate::presentation::websocket::Gateway;
use crate::shared::snowflake::SnowflakeGenerator;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub settings: Arc<Settings>,
    pub users: Arc<dyn UserRepository>,
    pub contacts: Arc<ContactService>,
    pub relay: Arc<MessageRelay>,
    pub gateway: Arc<Gateway>,
    pub translator: Arc<TranslationClient>,
}

impl AppState {
    /// Wire the relay, gateway and translation client together.
    ///
    /// `cipher` is the one encryption context for the process lifetime.
    pub fn new(
        settings: Arc<Settings>,
        db: PgPool,
        users: Arc<dyn UserRepository>,
        messages: Arc<dyn MessageRepository>,
        contacts: Arc<dyn ContactRepository>,
        broker: Arc<dyn Broker>,
        cipher: Arc<ContentCipher>,
    ) -> Self {
        let gateway = Arc::new(Gateway::new(settings.websocket.heartbeat_interval_ms));
        let translator = Arc::new(TranslationClient::from_settings(broker, &settings));
        let ids = Arc::new(SnowflakeGenerator::new(
            settings.snowflake.machine_id,
            settings.snowflake.epoch,
        ));

        let contacts = Arc::new(ContactService::new(users.clone(), contacts));
        let rooms: Arc<dyn RoomEmitter> = gateway.clone();
        let relay = Arc::new(MessageRelay::new(
            users.clone(),
            messages,
            translator.clone(),
            rooms,
            cipher,
            ids,
        ));

        Self {
            db,
            settings,
            users,
            contacts,
            relay,
            gateway,
            translator,
        }
    }
}

/// Application instance
pub struct Application {
    listener: TcpListener,
    router: Router,
    state: AppState,
    worker: Option<EmbeddedWorker>,
}

struct EmbeddedWorker {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Application {
    /// Build the application from settings
    pub async fn build(settings: Settings) -> Result<Self> {
        let settings = Arc::new(settings);
        health::init_server_start();

        let db = database::connect(&settings.database).await?;

        let cipher = Arc::new(
            ContentCipher::from_hex(&settings.encryption.key)
                .context("invalid encryption key")?,
        );

        let broker = open_broker(&settings.broker).context("failed to open message broker")?;
        tracing::info!(kind = broker.kind(), url = %settings.broker.url, "Message broker selected");

        let worker = if settings.worker.embedded {
            Some(spawn_embedded_worker(broker.clone(), &settings)?)
        } else {
            None
        };

        let state = AppState::new(
            settings.clone(),
            db.clone(),
            Arc::new(PgUserRepository::new(db.clone())),
            Arc::new(PgMessageRepository::new(db.clone())),
            Arc::new(PgContactRepository::new(db)),
            broker,
            cipher,
        );

        // Connect early; a failure here only means the first send reconnects.
        let manager = state.translator.manager().clone();
        tokio::spawn(async move {
            if let Err(e) = manager.ensure_connected().await {
                tracing::warn!(error = %e, "Broker unavailable at startup; translations degraded");
            }
        });

        let router = create_router(state.clone());

        let addr: SocketAddr = settings
            .server_addr()
            .parse()
            .with_context(|| format!("invalid server address {}", settings.server_addr()))?;
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Listening on {}", addr);

        Ok(Self {
            listener,
            router,
            state,
            worker,
        })
    }

    /// Run the server until Ctrl-C, then release the broker link.
    pub async fn run_until_stopped(self) -> Result<()> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        self.state.translator.shutdown().await;
        if let Some(worker) = self.worker {
            let _ = worker.stop.send(true);
            if let Err(e) = worker.handle.await {
                tracing::warn!(error = %e, "Embedded worker task failed");
            }
        }

        tracing::info!("Server stopped");
        Ok(())
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

fn spawn_embedded_worker(broker: Arc<dyn Broker>, settings: &Settings) -> Result<EmbeddedWorker> {
    let engine = Arc::new(OllamaEngine::new(&settings.worker).context("failed to build engine client")?);
    let worker = TranslationWorker::new(broker, engine, WorkerConfig::from(settings));
    let (stop, mut stopped) = watch::channel(false);

    let handle = tokio::spawn(async move {
        let shutdown = async move {
            let _ = stopped.wait_for(|stop| *stop).await;
        };
        if let Err(e) = worker.run(shutdown).await {
            tracing::error!(error = %e, "Embedded translation worker stopped");
        }
    });
    tracing::info!("Embedded translation worker started");

    Ok(EmbeddedWorker { stop, handle })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
