//! Application settings and configuration structures.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Root configuration structure containing all application settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Server configuration (host, port)
    pub server: ServerSettings,

    /// Database configuration (PostgreSQL)
    pub database: DatabaseSettings,

    /// Message broker configuration
    pub broker: BrokerSettings,

    /// Translation RPC settings
    pub translation: TranslationSettings,

    /// Encryption-at-rest settings
    pub encryption: EncryptionSettings,

    /// JWT authentication settings
    pub jwt: JwtSettings,

    /// Snowflake ID generator settings
    pub snowflake: SnowflakeSettings,

    /// CORS configuration
    pub cors: CorsSettings,

    /// WebSocket configuration
    pub websocket: WebSocketSettings,

    /// Translation worker settings
    pub worker: WorkerSettings,

    /// Current environment (development, staging, production)
    pub environment: String,
}

/// Server binding configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// Host address to bind to (e.g., "0.0.0.0")
    pub host: String,

    /// Port number to listen on
    pub port: u16,
}

/// PostgreSQL database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// Database connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections to maintain
    pub min_connections: u32,

    /// Connection acquire timeout in seconds
    pub acquire_timeout: u64,
}

/// Message broker configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerSettings {
    /// Broker URL: `redis://host:port` or `memory://`
    pub url: String,

    /// Well-known queue the translation workers consume from
    pub request_queue: String,

    /// Connection attempts before reporting the broker unreachable
    pub reconnect_attempts: u32,

    /// Fixed delay between connection attempts
    pub reconnect_delay_ms: u64,

    /// Upper bound for a single connection attempt
    pub connect_timeout_ms: u64,

    /// Fail-fast window after the retry budget was exhausted
    pub failure_cooldown_ms: u64,

    /// Sleep between polls of an empty queue
    pub poll_interval_ms: u64,

    /// Lifetime of an unattended private reply queue
    pub reply_queue_ttl_secs: u64,
}

/// Translation RPC settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TranslationSettings {
    /// Per-call deadline for a translation reply
    pub timeout_ms: u64,
}

/// Encryption-at-rest settings.
#[derive(Debug, Clone, Deserialize)]
pub struct EncryptionSettings {
    /// 32-byte ChaCha20-Poly1305 key, hex encoded
    pub key: String,
}

/// JWT authentication configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtSettings {
    /// Secret key for verifying tokens
    pub secret: String,
}

/// Snowflake ID generator configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SnowflakeSettings {
    /// Machine/worker ID (0-1023)
    pub machine_id: u16,

    /// Custom epoch timestamp in milliseconds
    pub epoch: u64,
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CorsSettings {
    /// Allowed origins (comma-separated in env)
    pub allowed_origins: Vec<String>,
}

/// WebSocket configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketSettings {
    /// Maximum message size in bytes (default: 64KB)
    pub max_message_size: usize,

    /// Heartbeat interval in milliseconds (default: 45000)
    pub heartbeat_interval_ms: u64,

    /// Connection timeout for identify in seconds (default: 30)
    pub identify_timeout_secs: u64,
}

/// Translation worker configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSettings {
    /// Consumer tag; names the worker's unacknowledged-delivery list
    pub consumer_tag: String,

    /// Base URL of the Ollama-compatible engine
    pub engine_url: String,

    /// Model name passed to the engine
    pub model: String,

    /// HTTP timeout for one engine call
    pub engine_timeout_secs: u64,

    /// Run a worker task inside the server process
    pub embedded: bool,
}

/// Minimum required length for JWT secret (256 bits = 32 bytes)
pub const MIN_JWT_SECRET_LENGTH: usize = 32;

/// Hex length of a 256-bit encryption key
pub const ENCRYPTION_KEY_HEX_LENGTH: usize = 64;

impl Settings {
    /// Load settings from environment variables and configuration files.
    ///
    /// The loading order is:
    /// 1. config/default.toml (base configuration)
    /// 2. config/{RUN_ENV}.toml (environment-specific overrides)
    /// 3. Environment variables (highest priority)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or parsed,
    /// or if the JWT secret or encryption key is malformed.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let environment = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".into());

        Config::builder()
            .set_default("environment", environment.clone())?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 5000)?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout", 30)?
            .set_default("broker.url", "redis://127.0.0.1:6379")?
            .set_default("broker.request_queue", "llm_queue")?
            .set_default("broker.reconnect_attempts", 5)?
            .set_default("broker.reconnect_delay_ms", 5000_i64)?
            .set_default("broker.connect_timeout_ms", 3000_i64)?
            .set_default("broker.failure_cooldown_ms", 10000_i64)?
            .set_default("broker.poll_interval_ms", 50_i64)?
            .set_default("broker.reply_queue_ttl_secs", 60)?
            .set_default("translation.timeout_ms", 30000_i64)?
            .set_default("snowflake.machine_id", 1)?
            .set_default("snowflake.epoch", 1_704_067_200_000_u64)?
            .set_default("cors.allowed_origins", vec!["http://localhost:3000"])?
            .set_default("websocket.max_message_size", 65536_i64)?
            .set_default("websocket.heartbeat_interval_ms", 45000_i64)?
            .set_default("websocket.identify_timeout_secs", 30_i64)?
            .set_default("worker.consumer_tag", "translation-worker-1")?
            .set_default("worker.engine_url", "http://localhost:11434")?
            .set_default("worker.model", "dolphin-llama3")?
            .set_default("worker.engine_timeout_secs", 120)?
            .set_default("worker.embedded", false)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // APP__BROKER__URL=redis://... -> broker.url
            .add_source(
                Environment::default()
                    .prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("server.host", std::env::var("SERVER_HOST").ok())?
            .set_override_option("server.port", std::env::var("SERVER_PORT").ok())?
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .set_override_option("broker.url", std::env::var("BROKER_URL").ok())?
            .set_override_option("encryption.key", std::env::var("ENCRYPTION_KEY").ok())?
            .set_override_option("jwt.secret", std::env::var("JWT_SECRET").ok())?
            .set_override_option(
                "translation.timeout_ms",
                std::env::var("TRANSLATION_TIMEOUT_MS").ok(),
            )?
            .set_override_option(
                "snowflake.machine_id",
                std::env::var("SNOWFLAKE_MACHINE_ID").ok(),
            )?
            .build()?
            .try_deserialize()
            .and_then(Self::validate)
    }

    /// Reject secrets that would make the process insecure or unable to
    /// decrypt its own history.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.jwt.secret.len() < MIN_JWT_SECRET_LENGTH {
            return Err(ConfigError::Message(format!(
                "JWT secret must be at least {} characters for security. Current length: {}",
                MIN_JWT_SECRET_LENGTH,
                self.jwt.secret.len()
            )));
        }

        let key = self.encryption.key.trim();
        if key.len() != ENCRYPTION_KEY_HEX_LENGTH || !key.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ConfigError::Message(format!(
                "Encryption key must be {} hex characters (32 bytes)",
                ENCRYPTION_KEY_HEX_LENGTH
            )));
        }

        if self.broker.reconnect_attempts == 0 {
            return Err(ConfigError::Message(
                "broker.reconnect_attempts must be at least 1".into(),
            ));
        }

        Ok(self)
    }

    /// Get the full server address as a string.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
