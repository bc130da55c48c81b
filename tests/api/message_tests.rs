//! Message and User API Tests

use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use babel_chat::application::dto::{MessagePayload, UserResponse};
use babel_chat::presentation::http::create_router;

use crate::common::{drain, events, PhraseBook, TestContext, ALICE, BOB};

fn server(ctx: &TestContext) -> TestServer {
    TestServer::new(create_router(ctx.state.clone())).unwrap()
}

#[tokio::test]
async fn test_send_requires_token() {
    let ctx = TestContext::new(1000);
    let response = server(&ctx)
        .post("/api/v1/messages")
        .json(&json!({"receiver_id": BOB, "content": "hello"}))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_send_rejects_garbage_token() {
    let ctx = TestContext::new(1000);
    let response = server(&ctx)
        .post("/api/v1/messages")
        .authorization_bearer("not-a-jwt")
        .json(&json!({"receiver_id": BOB, "content": "hello"}))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_send_returns_sender_view_and_notifies_receiver() {
    let ctx = TestContext::new(2000);
    let worker = ctx.spawn_worker(Arc::new(PhraseBook::new(&[("hello", "hola")])));
    let mut bob = ctx.join("bob-phone", BOB);
    drain(&mut bob);

    let response = server(&ctx)
        .post("/api/v1/messages")
        .authorization_bearer(ctx.token_for(ALICE))
        .json(&json!({"receiver_id": BOB, "content": "hello"}))
        .await;

    response.assert_status(StatusCode::CREATED);
    let body: MessagePayload = response.json();
    assert_eq!(body.content, "hello");
    assert_eq!(body.sender, "alice");
    assert!(body.translated);

    let created = events(&drain(&mut bob), "MESSAGE_CREATE");
    assert_eq!(created.len(), 1);
    assert_eq!(created[0]["content"], "hola");

    worker.stop().await;
}

#[tokio::test]
async fn test_send_to_unknown_receiver_is_404() {
    let ctx = TestContext::new(1000);
    let response = server(&ctx)
        .post("/api/v1/messages")
        .authorization_bearer(ctx.token_for(ALICE))
        .json(&json!({"receiver_id": 404, "content": "hello"}))
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["message"], "Receiver not found");
}

#[tokio::test]
async fn test_send_empty_content_is_400() {
    let ctx = TestContext::new(1000);
    let response = server(&ctx)
        .post("/api/v1/messages")
        .authorization_bearer(ctx.token_for(ALICE))
        .json(&json!({"receiver_id": BOB, "content": ""}))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(ctx.messages.len(), 0);
}

#[tokio::test]
async fn test_conversation_lists_viewer_perspective() {
    let ctx = TestContext::new(2000);
    let worker = ctx.spawn_worker(Arc::new(PhraseBook::new(&[("hello", "hola")])));
    ctx.state.relay.send(ALICE, BOB, "hello").await.unwrap();

    let response = server(&ctx)
        .get(&format!("/api/v1/messages/{}", ALICE))
        .authorization_bearer(ctx.token_for(BOB))
        .await;

    response.assert_status_ok();
    let history: Vec<MessagePayload> = response.json();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].content, "hola");
    assert_eq!(history[0].sender, "alice");

    worker.stop().await;
}

#[tokio::test]
async fn test_conversation_limit_out_of_range_is_400() {
    let ctx = TestContext::new(1000);
    let response = server(&ctx)
        .get(&format!("/api/v1/messages/{}", BOB))
        .add_query_param("limit", 500)
        .authorization_bearer(ctx.token_for(ALICE))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_retry_with_malformed_id_is_400() {
    let ctx = TestContext::new(1000);
    let response = server(&ctx)
        .post("/api/v1/messages/abc/translation")
        .authorization_bearer(ctx.token_for(ALICE))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_retry_unknown_message_is_404() {
    let ctx = TestContext::new(1000);
    let response = server(&ctx)
        .post("/api/v1/messages/12345/translation")
        .authorization_bearer(ctx.token_for(ALICE))
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_user_lookup_by_username_and_email() {
    let ctx = TestContext::new(1000);
    let server = server(&ctx);

    let response = server
        .get("/api/v1/users/lookup")
        .add_query_param("q", "bob")
        .authorization_bearer(ctx.token_for(ALICE))
        .await;
    response.assert_status_ok();
    let user: Value = response.json();
    assert_eq!(user["username"], "bob");
    assert_eq!(user["language"], "es");

    let response = server
        .get("/api/v1/users/lookup")
        .add_query_param("q", "alice@example.com")
        .authorization_bearer(ctx.token_for(BOB))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["id"], ALICE.to_string());

    let response = server
        .get("/api/v1/users/lookup")
        .add_query_param("q", "nobody")
        .authorization_bearer(ctx.token_for(ALICE))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[test]
fn test_user_response_omits_email() {
    let response = UserResponse::from(crate::common::user(9, "carol", "fr", "FR"));
    let json = serde_json::to_value(response).unwrap();
    assert!(json.get("email").is_none());
    assert_eq!(json["dialect"], "FR");
}
