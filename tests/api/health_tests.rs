//! Health Check and Metrics API Tests

use axum_test::TestServer;
use serde_json::Value;

use babel_chat::presentation::http::create_router;

use crate::common::TestContext;

fn server(ctx: &TestContext) -> TestServer {
    TestServer::new(create_router(ctx.state.clone())).unwrap()
}

#[tokio::test]
async fn test_health_check_returns_ok() {
    let ctx = TestContext::new(1000);
    let response = server(&ctx).get("/health").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_liveness_reports_alive() {
    let ctx = TestContext::new(1000);
    let response = server(&ctx).get("/health/live").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "alive");
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_registry() {
    let ctx = TestContext::new(1000);
    let server = server(&ctx);
    server.get("/health").await.assert_status_ok();

    let response = server.get("/metrics").await;

    response.assert_status_ok();
    assert!(response.text().contains("babel_chat_http_requests_total"));
}
