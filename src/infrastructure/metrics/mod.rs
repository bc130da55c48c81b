//! Prometheus Metrics Module
//!
//! Provides application-wide metrics collection using Prometheus.
//!
//! # Metrics Collected
//! - Translation RPC calls by outcome, and their latency
//! - Pending (awaiting reply) RPC calls
//! - Broker connection attempts by result
//! - Relayed messages by translation outcome
//! - Active WebSocket sessions
//! - HTTP request counts by method, path, and status

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};

const NAMESPACE: &str = "babel_chat";

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Translation RPC calls by outcome ("translated", "timed_out", ...)
pub static RPC_CALLS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("rpc_calls_total", "Translation RPC calls by outcome").namespace(NAMESPACE),
        &["outcome"],
    )
    .expect("Failed to create RPC_CALLS_TOTAL metric")
});

/// Translation RPC latency, publish to resolution
pub static RPC_CALL_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let buckets = vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0];
    HistogramVec::new(
        HistogramOpts::new(
            "rpc_call_duration_seconds",
            "Translation RPC round-trip latency in seconds",
        )
        .namespace(NAMESPACE)
        .buckets(buckets),
        &["outcome"],
    )
    .expect("Failed to create RPC_CALL_DURATION_SECONDS metric")
});

/// Calls registered and still waiting for a reply
pub static RPC_PENDING_CALLS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::with_opts(
        Opts::new("rpc_pending_calls", "Translation calls awaiting a reply").namespace(NAMESPACE),
    )
    .expect("Failed to create RPC_PENDING_CALLS metric")
});

/// Broker connection attempts by result ("connected", "failed", "cooldown")
pub static BROKER_CONNECTIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("broker_connections_total", "Broker connection attempts by result")
            .namespace(NAMESPACE),
        &["result"],
    )
    .expect("Failed to create BROKER_CONNECTIONS_TOTAL metric")
});

/// Relayed messages by outcome ("translated", "untranslated")
pub static RELAY_MESSAGES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("relay_messages_total", "Relayed chat messages by translation outcome")
            .namespace(NAMESPACE),
        &["outcome"],
    )
    .expect("Failed to create RELAY_MESSAGES_TOTAL metric")
});

/// Active WebSocket sessions
pub static WEBSOCKET_SESSIONS_ACTIVE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("websocket_sessions_active", "Number of active WebSocket sessions")
            .namespace(NAMESPACE),
        &["state"], // "connected", "identified"
    )
    .expect("Failed to create WEBSOCKET_SESSIONS_ACTIVE metric")
});

/// HTTP request counter
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests").namespace(NAMESPACE),
        &["method", "path", "status"],
    )
    .expect("Failed to create HTTP_REQUESTS_TOTAL metric")
});

fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(RPC_CALLS_TOTAL.clone()))
        .expect("Failed to register RPC_CALLS_TOTAL");
    registry
        .register(Box::new(RPC_CALL_DURATION_SECONDS.clone()))
        .expect("Failed to register RPC_CALL_DURATION_SECONDS");
    registry
        .register(Box::new(RPC_PENDING_CALLS.clone()))
        .expect("Failed to register RPC_PENDING_CALLS");
    registry
        .register(Box::new(BROKER_CONNECTIONS_TOTAL.clone()))
        .expect("Failed to register BROKER_CONNECTIONS_TOTAL");
    registry
        .register(Box::new(RELAY_MESSAGES_TOTAL.clone()))
        .expect("Failed to register RELAY_MESSAGES_TOTAL");
    registry
        .register(Box::new(WEBSOCKET_SESSIONS_ACTIVE.clone()))
        .expect("Failed to register WEBSOCKET_SESSIONS_ACTIVE");
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .expect("Failed to register HTTP_REQUESTS_TOTAL");
}

/// Collect and encode all metrics as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Record one finished RPC call
pub fn record_rpc_call(outcome: &str, duration_secs: f64) {
    RPC_CALLS_TOTAL.with_label_values(&[outcome]).inc();
    RPC_CALL_DURATION_SECONDS
        .with_label_values(&[outcome])
        .observe(duration_secs);
}

/// Record a broker connection attempt
pub fn record_broker_connection(result: &str) {
    BROKER_CONNECTIONS_TOTAL.with_label_values(&[result]).inc();
}

/// Record a relayed message
pub fn record_relay_message(translated: bool) {
    let outcome = if translated { "translated" } else { "untranslated" };
    RELAY_MESSAGES_TOTAL.with_label_values(&[outcome]).inc();
}

/// Helper to update WebSocket session counts
pub fn set_websocket_sessions(connected: i64, identified: i64) {
    WEBSOCKET_SESSIONS_ACTIVE
        .with_label_values(&["connected"])
        .set(connected);
    WEBSOCKET_SESSIONS_ACTIVE
        .with_label_values(&["identified"])
        .set(identified);
}

/// Helper to record HTTP request metrics
pub fn record_http_request(method: &str, path: &str, status: u16) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        let _ = &*REGISTRY;
        let _ = &*RPC_CALLS_TOTAL;
        let _ = &*RPC_PENDING_CALLS;
        let _ = &*RELAY_MESSAGES_TOTAL;
    }

    #[test]
    fn test_record_rpc_call() {
        record_rpc_call("translated", 0.2);
        let metrics = gather_metrics();
        assert!(metrics.contains("babel_chat_rpc_calls_total"));
        assert!(metrics.contains("babel_chat_rpc_call_duration_seconds"));
    }

    #[test]
    fn test_record_relay_message() {
        record_relay_message(false);
        let metrics = gather_metrics();
        assert!(metrics.contains("outcome=\"untranslated\""));
    }
}
