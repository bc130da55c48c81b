//! Health Check Handlers
//!
//! `/health` and `/health/live` answer without touching dependencies.
//! `/health/ready` pings PostgreSQL and reports the translation broker
//! link; only a database outage makes the node unready, since sends still
//! go out untranslated while the broker is away.

use std::time::Instant;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::Serialize;

use crate::infrastructure::database;
use crate::startup::AppState;

/// Database round trips slower than this mark the check degraded
const SLOW_DATABASE_MS: u64 = 100;

static STARTED: Lazy<(Instant, DateTime<Utc>)> = Lazy::new(|| (Instant::now(), Utc::now()));

/// Pin the start time; call once during startup
pub fn init_server_start() {
    Lazy::force(&STARTED);
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct LivenessResponse {
    pub status: &'static str,
}

/// Result of checking one dependency
#[derive(Debug, Serialize)]
pub struct DependencyCheck {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl DependencyCheck {
    fn timed(latency_ms: u64) -> Self {
        Self {
            status: if latency_ms < SLOW_DATABASE_MS {
                HealthStatus::Healthy
            } else {
                HealthStatus::Degraded
            },
            latency_ms: Some(latency_ms),
            detail: None,
        }
    }

    fn down(detail: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            latency_ms: None,
            detail: Some(detail.into()),
        }
    }
}

/// Live gateway and translation counters
#[derive(Debug, Serialize)]
pub struct GatewayStats {
    pub sessions: usize,
    pub rooms: usize,
    pub translations_in_flight: usize,
    pub pending_rpc_calls: usize,
}

#[derive(Debug, Serialize)]
pub struct ReadinessReport {
    pub status: HealthStatus,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub started_at: String,
    pub database: DependencyCheck,
    pub broker: DependencyCheck,
    pub gateway: GatewayStats,
}

impl ReadinessReport {
    /// Database state decides readiness; a broker problem only degrades it.
    fn overall(database: &DependencyCheck, broker: &DependencyCheck) -> HealthStatus {
        match database.status {
            HealthStatus::Unhealthy => HealthStatus::Unhealthy,
            db => db.max(broker.status.min(HealthStatus::Degraded)),
        }
    }

    fn status_code(&self) -> StatusCode {
        if self.status == HealthStatus::Unhealthy {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::OK
        }
    }
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn liveness() -> Json<LivenessResponse> {
    Json(LivenessResponse { status: "alive" })
}

pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let database = check_database(&state).await;
    let broker = check_broker(&state);
    let (started, started_at) = &*STARTED;

    let report = ReadinessReport {
        status: ReadinessReport::overall(&database, &broker),
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: started.elapsed().as_secs(),
        started_at: started_at.to_rfc3339(),
        database,
        broker,
        gateway: GatewayStats {
            sessions: state.gateway.session_count(),
            rooms: state.gateway.room_count(),
            translations_in_flight: state.relay.translations_in_flight(),
            pending_rpc_calls: state.translator.pending_calls(),
        },
    };

    if report.status != HealthStatus::Healthy {
        tracing::warn!(status = ?report.status, "Readiness check not healthy");
    }
    (report.status_code(), Json(report))
}

async fn check_database(state: &AppState) -> DependencyCheck {
    let start = Instant::now();
    match database::ping(&state.db).await {
        Ok(()) => DependencyCheck::timed(start.elapsed().as_millis() as u64),
        Err(e) => DependencyCheck::down(format!("Database unreachable: {}", e)),
    }
}

/// Reads the current link state; never triggers a reconnect.
fn check_broker(state: &AppState) -> DependencyCheck {
    if state.translator.manager().is_connected() {
        DependencyCheck {
            status: HealthStatus::Healthy,
            latency_ms: None,
            detail: None,
        }
    } else {
        DependencyCheck::down("Broker not connected; messages are delivered untranslated")
    }
}
