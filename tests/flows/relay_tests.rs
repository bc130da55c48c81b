//! Chat sends through the relay, translation worker and gateway rooms.

use std::sync::Arc;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;

use babel_chat::application::dto::MessagePayload;
use babel_chat::application::services::RelayError;
use babel_chat::domain::DEGRADED_NOTICE;

use crate::common::{drain, events, PhraseBook, TestContext, ALICE, BOB, REQUEST_QUEUE};

fn payloads(values: Vec<serde_json::Value>) -> Vec<MessagePayload> {
    values
        .into_iter()
        .map(|v| serde_json::from_value(v).unwrap())
        .collect()
}

#[tokio::test]
async fn test_translated_message_reaches_receiver_room() {
    let ctx = TestContext::new(2000);
    let worker = ctx.spawn_worker(Arc::new(PhraseBook::new(&[("hello", "hola")])));
    let mut bob = ctx.join("bob-phone", BOB);
    let mut alice = ctx.join("alice-laptop", ALICE);
    drain(&mut bob);
    drain(&mut alice);

    let sent = ctx.state.relay.send(ALICE, BOB, "hello").await.unwrap();

    assert!(sent.message.is_translated());
    assert_eq!(sent.delivered, 1);
    assert_eq!(sent.notice, None);
    let view = sent.view();
    assert_eq!(view.content, "hello");
    assert!(view.translated);

    let created = payloads(events(&drain(&mut bob), "MESSAGE_CREATE"));
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].sender, "alice");
    assert_eq!(created[0].content, "hola");
    assert!(created[0].translated);

    assert!(events(&drain(&mut alice), "MESSAGE_CREATE").is_empty());

    let stored = ctx.messages.get(sent.message.id).unwrap();
    assert!(stored.is_translated());
    assert_eq!(stored.translated_content(), Some("hola"));
    assert_eq!(stored.content(), None);
    assert_ne!(stored.encrypted_content, b"hello".to_vec());

    worker.stop().await;
}

#[tokio::test]
async fn test_without_worker_message_is_delivered_untranslated() {
    let ctx = TestContext::new(200);
    let mut bob = ctx.join("bob-phone", BOB);
    drain(&mut bob);

    let started = Instant::now();
    let sent = ctx.state.relay.send(ALICE, BOB, "hello").await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(200));
    assert!(!sent.message.is_translated());
    assert_eq!(sent.notice.as_deref(), Some(DEGRADED_NOTICE));
    assert_eq!(sent.view().content, "hello");

    let created = payloads(events(&drain(&mut bob), "MESSAGE_CREATE"));
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].content, "hello");
    assert!(!created[0].translated);
    assert_eq!(created[0].notice.as_deref(), Some(DEGRADED_NOTICE));

    let stored = ctx.messages.get(sent.message.id).unwrap();
    assert!(!stored.is_translated());
    assert_eq!(stored.translated_content(), None);
}

#[tokio::test]
async fn test_broker_down_still_persists_and_delivers() {
    let ctx = TestContext::new(2000);
    ctx.broker.set_available(false);
    let mut bob = ctx.join("bob-phone", BOB);
    drain(&mut bob);

    let started = Instant::now();
    let sent = ctx.state.relay.send(ALICE, BOB, "hello").await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!sent.message.is_translated());
    assert_eq!(ctx.messages.len(), 1);
    assert_eq!(events(&drain(&mut bob), "MESSAGE_CREATE").len(), 1);
}

#[tokio::test]
async fn test_offline_receiver_gets_nothing_in_real_time() {
    let ctx = TestContext::new(2000);
    let worker = ctx.spawn_worker(Arc::new(PhraseBook::new(&[("hello", "hola")])));

    let sent = ctx.state.relay.send(ALICE, BOB, "hello").await.unwrap();

    assert_eq!(sent.delivered, 0);
    assert!(sent.message.is_translated());

    worker.stop().await;
}

#[tokio::test]
async fn test_every_session_of_the_receiver_gets_the_message() {
    let ctx = TestContext::new(2000);
    let worker = ctx.spawn_worker(Arc::new(PhraseBook::new(&[("hello", "hola")])));
    let mut phone = ctx.join("bob-phone", BOB);
    let mut laptop = ctx.join("bob-laptop", BOB);

    let sent = ctx.state.relay.send(ALICE, BOB, "hello").await.unwrap();

    assert_eq!(sent.delivered, 2);
    assert_eq!(events(&drain(&mut phone), "MESSAGE_CREATE").len(), 1);
    assert_eq!(events(&drain(&mut laptop), "MESSAGE_CREATE").len(), 1);

    worker.stop().await;
}

#[tokio::test]
async fn test_unknown_receiver_is_rejected_before_storage() {
    let ctx = TestContext::new(2000);

    let err = ctx.state.relay.send(ALICE, 404, "hello").await.unwrap_err();

    assert!(matches!(err, RelayError::ReceiverNotFound));
    assert_eq!(ctx.messages.len(), 0);
}

#[tokio::test]
async fn test_history_shows_each_participant_their_own_view() {
    let ctx = TestContext::new(2000);
    let worker = ctx.spawn_worker(Arc::new(PhraseBook::new(&[("hello", "hola")])));

    ctx.state.relay.send(ALICE, BOB, "hello").await.unwrap();
    ctx.state.relay.send(BOB, ALICE, "gracias").await.unwrap();

    let bob_view = ctx.state.relay.conversation(BOB, ALICE, None).await.unwrap();
    let contents: Vec<&str> = bob_view.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["hola", "gracias"]);

    let alice_view = ctx.state.relay.conversation(ALICE, BOB, None).await.unwrap();
    let contents: Vec<&str> = alice_view.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["hello", "GRACIAS"]);

    let latest = ctx.state.relay.conversation(ALICE, BOB, Some(1)).await.unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].content, "GRACIAS");

    worker.stop().await;
}

#[tokio::test]
async fn test_retry_translates_once_worker_is_back() {
    let ctx = TestContext::new(300);
    let mut bob = ctx.join("bob-phone", BOB);

    let sent = ctx.state.relay.send(ALICE, BOB, "hello").await.unwrap();
    assert!(!sent.message.is_translated());
    drain(&mut bob);

    // The timed-out request is still queued with nobody waiting on it.
    assert_eq!(ctx.broker.purge(REQUEST_QUEUE), 1);
    assert_eq!(ctx.state.translator.pending_calls(), 0);

    let worker = ctx.spawn_worker(Arc::new(PhraseBook::new(&[("hello", "hola")])));
    let view = ctx
        .state
        .relay
        .retry_translation(sent.message.id, ALICE)
        .await
        .unwrap();

    assert!(view.translated);
    assert_eq!(view.content, "hello");

    let updates = payloads(events(&drain(&mut bob), "MESSAGE_UPDATE"));
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].content, "hola");
    assert!(updates[0].translated);

    let err = ctx
        .state
        .relay
        .retry_translation(sent.message.id, BOB)
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::AlreadyTranslated));

    worker.stop().await;
}

#[tokio::test]
async fn test_outsider_cannot_retry() {
    let ctx = TestContext::new(100);
    let sent = ctx.state.relay.send(ALICE, BOB, "hello").await.unwrap();

    let err = ctx
        .state
        .relay
        .retry_translation(sent.message.id, 3)
        .await
        .unwrap_err();

    assert!(matches!(err, RelayError::Forbidden));
}
