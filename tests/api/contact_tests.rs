//! Contact API Tests

use axum::http::StatusCode;
use axum_test::TestServer;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use babel_chat::presentation::http::create_router;

use crate::common::{TestContext, ALICE, BOB};

fn server(ctx: &TestContext) -> TestServer {
    TestServer::new(create_router(ctx.state.clone())).unwrap()
}

#[tokio::test]
async fn test_contacts_require_token() {
    let ctx = TestContext::new(1000);
    let server = server(&ctx);

    server
        .get("/api/v1/contacts")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    server
        .post("/api/v1/contacts")
        .json(&json!({"username": "bob"}))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_add_then_list_contact() {
    let ctx = TestContext::new(1000);
    let server = server(&ctx);
    let token = ctx.token_for(ALICE);

    let response = server
        .post("/api/v1/contacts")
        .authorization_bearer(&token)
        .json(&json!({"username": "bob"}))
        .await;
    response.assert_status(StatusCode::CREATED);
    let added: Value = response.json();
    assert_eq!(added["id"], BOB.to_string());
    assert_eq!(added["language"], "es");

    let response = server
        .get("/api/v1/contacts")
        .authorization_bearer(&token)
        .await;
    response.assert_status_ok();
    let listed: Vec<Value> = response.json();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["username"], "bob");
    assert!(listed[0]["added_at"].is_string());

    // Contact lists are one-directional
    let response = server
        .get("/api/v1/contacts")
        .authorization_bearer(ctx.token_for(BOB))
        .await;
    let listed: Vec<Value> = response.json();
    assert!(listed.is_empty());
}

#[tokio::test]
async fn test_add_contact_twice_is_conflict() {
    let ctx = TestContext::new(1000);
    let server = server(&ctx);
    let token = ctx.token_for(ALICE);

    server
        .post("/api/v1/contacts")
        .authorization_bearer(&token)
        .json(&json!({"username": "bob"}))
        .await
        .assert_status(StatusCode::CREATED);

    let response = server
        .post("/api/v1/contacts")
        .authorization_bearer(&token)
        .json(&json!({"username": "bob"}))
        .await;
    response.assert_status(StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["message"], "Contact already added");
}

#[tokio::test]
async fn test_add_unknown_contact_is_404() {
    let ctx = TestContext::new(1000);
    let response = server(&ctx)
        .post("/api/v1/contacts")
        .authorization_bearer(ctx.token_for(ALICE))
        .json(&json!({"username": "mallory"}))
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["message"], "User not found");
}

#[tokio::test]
async fn test_add_self_or_blank_is_rejected() {
    let ctx = TestContext::new(1000);
    let server = server(&ctx);
    let token = ctx.token_for(ALICE);

    server
        .post("/api/v1/contacts")
        .authorization_bearer(&token)
        .json(&json!({"username": "alice"}))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    server
        .post("/api/v1/contacts")
        .authorization_bearer(&token)
        .json(&json!({"username": ""}))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let listed: Vec<Value> = server
        .get("/api/v1/contacts")
        .authorization_bearer(&token)
        .await
        .json();
    assert!(listed.is_empty());
}
