//! Translation RPC round trips over the in-process broker.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use pretty_assertions::assert_eq;

use babel_chat::domain::{ReplyBody, RequestBody, Translation, Translator, UnavailableReason};
use babel_chat::infrastructure::broker::{
    unacked_queue, Broker, BrokerChannel, Envelope, Properties,
};
use babel_chat::infrastructure::rpc::CorrelationRegistry;

use crate::common::{BrokenEngine, PhraseBook, TestContext, REQUEST_QUEUE};

fn reason(outcome: &Translation) -> Option<UnavailableReason> {
    match outcome {
        Translation::Translated(_) => None,
        Translation::Unavailable(u) => Some(u.reason),
    }
}

/// Take `count` requests off the shared queue without answering them.
async fn collect_requests(channel: &Arc<dyn BrokerChannel>, count: usize) -> Vec<Envelope> {
    let mut requests = Vec::new();
    while requests.len() < count {
        if let Some(envelope) = channel
            .consume(REQUEST_QUEUE, Duration::from_secs(2))
            .await
            .unwrap()
        {
            requests.push(envelope);
        }
    }
    requests
}

async fn reply(channel: &Arc<dyn BrokerChannel>, request: &Envelope, text: String) {
    let envelope = Envelope::json(
        &ReplyBody::translated(text),
        Properties {
            correlation_id: request.properties.correlation_id.clone(),
            reply_to: None,
        },
    )
    .unwrap();
    channel
        .publish(request.reply_to().unwrap(), &envelope)
        .await
        .unwrap();
}

fn request_text(envelope: &Envelope) -> String {
    serde_json::from_str::<RequestBody>(&envelope.body).unwrap().text
}

#[tokio::test]
async fn test_worker_round_trip() {
    let ctx = TestContext::new(2000);
    let worker = ctx.spawn_worker(Arc::new(PhraseBook::new(&[(
        "see you in the morning",
        "nos vemos por la mañana",
    )])));

    let outcome = ctx
        .state
        .translator
        .translate_with_timeout("see you in the morning", "es", Some("ES"), Duration::from_secs(2))
        .await;

    match outcome {
        Translation::Translated(response) => {
            assert_eq!(response.translated_text, "nos vemos por la mañana");
            assert_eq!(response.original_text, "see you in the morning");
            assert_eq!(response.source_lang.as_deref(), Some("en"));
            assert_eq!(response.source_dialect.as_deref(), Some("US"));
            assert_eq!(response.target_lang, "es");
            assert_eq!(response.target_dialect.as_deref(), Some("ES"));
        }
        other => panic!("expected a translation, got {other:?}"),
    }
    assert_eq!(ctx.state.translator.pending_calls(), 0);

    worker.stop().await;
}

#[tokio::test]
async fn test_out_of_order_replies_reach_their_own_callers() {
    let ctx = TestContext::new(2000);
    let channel = ctx.broker.connect().await.unwrap();
    channel.declare_queue(REQUEST_QUEUE).await.unwrap();

    let responder = tokio::spawn(async move {
        let requests = collect_requests(&channel, 5).await;
        for request in requests.iter().rev() {
            let text = request_text(request);
            reply(&channel, request, format!("{}-es", text)).await;
        }
    });

    let texts: Vec<String> = (0..5).map(|i| format!("message {}", i)).collect();
    let calls = texts.iter().map(|text| {
        ctx.state
            .translator
            .translate_with_timeout(text, "es", None, Duration::from_secs(3))
    });
    let outcomes = join_all(calls).await;
    responder.await.unwrap();

    for (text, outcome) in texts.iter().zip(&outcomes) {
        assert_eq!(outcome.text(), Some(format!("{}-es", text).as_str()));
    }
    assert_eq!(ctx.state.translator.pending_calls(), 0);
}

#[tokio::test]
async fn test_no_worker_times_out_and_releases_entry() {
    let ctx = TestContext::new(2000);

    let started = Instant::now();
    let outcome = ctx
        .state
        .translator
        .translate_with_timeout("hello", "es", None, Duration::from_millis(150))
        .await;

    assert_eq!(reason(&outcome), Some(UnavailableReason::TimedOut));
    assert!(started.elapsed() >= Duration::from_millis(150));
    assert_eq!(ctx.state.translator.pending_calls(), 0);
}

#[tokio::test]
async fn test_unreachable_broker_fails_within_retry_budget() {
    let ctx = TestContext::new(2000);
    ctx.broker.set_available(false);

    let started = Instant::now();
    let outcome = ctx
        .state
        .translator
        .translate_with_timeout("hello", "es", None, Duration::from_secs(5))
        .await;

    assert_eq!(reason(&outcome), Some(UnavailableReason::ConnectionFailed));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!ctx.state.translator.manager().is_connected());
}

#[tokio::test]
async fn test_error_reply_resolves_without_waiting_for_timeout() {
    let ctx = TestContext::new(2000);
    let worker = ctx.spawn_worker(Arc::new(BrokenEngine));

    let started = Instant::now();
    let outcome = ctx
        .state
        .translator
        .translate_with_timeout("hello", "es", None, Duration::from_secs(5))
        .await;

    assert_eq!(reason(&outcome), Some(UnavailableReason::WorkerError));
    assert!(started.elapsed() < Duration::from_secs(5));

    worker.stop().await;
}

#[tokio::test]
async fn test_late_reply_is_dropped_and_never_reaches_newer_call() {
    let ctx = TestContext::new(2000);
    let channel = ctx.broker.connect().await.unwrap();
    channel.declare_queue(REQUEST_QUEUE).await.unwrap();

    let responder = tokio::spawn(async move {
        let first = collect_requests(&channel, 1).await.remove(0);
        tokio::time::sleep(Duration::from_millis(300)).await;
        reply(&channel, &first, "stale".into()).await;

        let second = collect_requests(&channel, 1).await.remove(0);
        reply(&channel, &second, request_text(&second).to_uppercase()).await;
    });

    let first = ctx
        .state
        .translator
        .translate_with_timeout("first", "es", None, Duration::from_millis(100))
        .await;
    assert_eq!(reason(&first), Some(UnavailableReason::TimedOut));

    let second = ctx
        .state
        .translator
        .translate_with_timeout("second", "es", None, Duration::from_secs(2))
        .await;
    assert_eq!(second.text(), Some("SECOND"));

    responder.await.unwrap();
    assert_eq!(ctx.state.translator.pending_calls(), 0);
}

#[tokio::test]
async fn test_reconnect_after_broker_restart_uses_fresh_reply_queue() {
    let ctx = TestContext::new(2000);
    let worker = ctx.spawn_worker(Arc::new(PhraseBook::new(&[("hello", "hola")])));
    let manager = ctx.state.translator.manager();

    let before = manager.ensure_connected().await.unwrap().reply_queue().to_string();
    assert_eq!(
        ctx.state.translator.translate("hello", "es", None).await.text(),
        Some("hola")
    );

    ctx.broker.sever_connections();
    assert!(!manager.is_connected());

    assert_eq!(
        ctx.state.translator.translate("hello", "es", None).await.text(),
        Some("hola")
    );
    let after = manager.ensure_connected().await.unwrap().reply_queue().to_string();
    assert_ne!(before, after);
    assert!(!ctx.broker.has_queue(&before));

    worker.stop().await;
}

#[test]
fn test_correlation_ids_unique_across_rapid_calls() {
    let registry = Arc::new(CorrelationRegistry::<String>::new());
    let slots: Vec<_> = (0..1000).map(|_| registry.register()).collect();
    let ids: HashSet<&str> = slots.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids.len(), 1000);
}

#[tokio::test]
async fn test_undecodable_request_is_not_redelivered_on_restart() {
    let ctx = TestContext::new(2000);
    let parked = unacked_queue(REQUEST_QUEUE, &ctx.settings.worker.consumer_tag);
    ctx.broker.push_raw(REQUEST_QUEUE, "not an envelope");

    for round in 0..3 {
        let worker = ctx.spawn_worker(Arc::new(PhraseBook::new(&[])));
        tokio::time::sleep(Duration::from_millis(50)).await;
        worker.stop().await;

        assert_eq!(ctx.broker.queue_len(REQUEST_QUEUE), 0, "round {round}");
        assert_eq!(ctx.broker.queue_len(&parked), 0, "round {round}");
    }

    let worker = ctx.spawn_worker(Arc::new(PhraseBook::new(&[("thanks", "gracias")])));
    let outcome = ctx
        .state
        .translator
        .translate_with_timeout("thanks", "es", None, Duration::from_secs(2))
        .await;
    assert_eq!(outcome.text(), Some("gracias"));

    worker.stop().await;
}
