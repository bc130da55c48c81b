//! Translation RPC client.
//!
//! Publishes a request to the shared request queue with `reply_to` set to
//! the manager's private reply queue, then waits on the correlation
//! registry. The manager's consume loop resolves replies by correlation id,
//! so concurrent calls share one connection and out-of-order replies reach
//! the right caller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::instrument;

use super::correlation::{CorrelationRegistry, RegistryError};
use crate::config::Settings;
use crate::domain::services::{Translation, Translator, UnavailableReason};
use crate::domain::value_objects::{ReplyBody, TranslationRequest, TranslationResponse};
use crate::infrastructure::broker::{
    Broker, ConnectionManager, Envelope, EnvelopeHandler, Properties, ReconnectPolicy,
};
use crate::infrastructure::metrics;

/// Translation RPC client. Cheap to share behind an `Arc`.
pub struct TranslationClient {
    manager: Arc<ConnectionManager>,
    registry: Arc<CorrelationRegistry<ReplyBody>>,
    request_queue: String,
    timeout: Duration,
}

impl TranslationClient {
    pub fn new(
        broker: Arc<dyn Broker>,
        policy: ReconnectPolicy,
        request_queue: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let request_queue = request_queue.into();
        let registry = Arc::new(CorrelationRegistry::new());
        let manager = Arc::new(ConnectionManager::new(
            broker,
            policy,
            vec![request_queue.clone()],
            reply_handler(Arc::clone(&registry)),
        ));

        Self {
            manager,
            registry,
            request_queue,
            timeout,
        }
    }

    pub fn from_settings(broker: Arc<dyn Broker>, settings: &Settings) -> Self {
        Self::new(
            broker,
            ReconnectPolicy::from(&settings.broker),
            settings.broker.request_queue.clone(),
            Duration::from_millis(settings.translation.timeout_ms),
        )
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// Calls waiting for a reply.
    pub fn pending_calls(&self) -> usize {
        self.registry.len()
    }

    pub fn default_timeout(&self) -> Duration {
        self.timeout
    }

    /// Translate with an explicit deadline for the reply.
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    pub async fn translate_with_timeout(
        &self,
        text: &str,
        target_language: &str,
        target_dialect: Option<&str>,
        timeout: Duration,
    ) -> Translation {
        let started = Instant::now();
        let outcome = self
            .call(text, target_language, target_dialect, timeout)
            .await;

        let label = match &outcome {
            Translation::Translated(_) => "translated",
            Translation::Unavailable(u) => u.reason.as_str(),
        };
        metrics::record_rpc_call(label, started.elapsed().as_secs_f64());
        metrics::RPC_PENDING_CALLS.set(self.registry.len() as i64);

        if let Translation::Unavailable(u) = &outcome {
            tracing::warn!(reason = %u.reason, detail = %u.detail, "Translation unavailable");
        }
        outcome
    }

    async fn call(
        &self,
        text: &str,
        target_language: &str,
        target_dialect: Option<&str>,
        timeout: Duration,
    ) -> Translation {
        let link = match self.manager.ensure_connected().await {
            Ok(link) => link,
            Err(e) => return Translation::unavailable(UnavailableReason::ConnectionFailed, e.to_string()),
        };

        let (correlation_id, slot) = self.registry.register();
        metrics::RPC_PENDING_CALLS.set(self.registry.len() as i64);

        let request = TranslationRequest {
            correlation_id,
            reply_address: link.reply_queue().to_string(),
            source_text: text.to_string(),
            target_language: target_language.to_string(),
            target_dialect: target_dialect.map(str::to_string),
        };

        let envelope = match Envelope::json(
            &request.body(),
            Properties {
                correlation_id: Some(request.correlation_id.clone()),
                reply_to: Some(request.reply_address.clone()),
            },
        ) {
            Ok(envelope) => envelope,
            Err(e) => return Translation::unavailable(UnavailableReason::PublishFailed, e.to_string()),
        };

        if let Err(e) = link.publish(&self.request_queue, &envelope).await {
            self.manager.invalidate(&link).await;
            return Translation::unavailable(UnavailableReason::PublishFailed, e.to_string());
        }

        tracing::debug!(
            correlation_id = %request.correlation_id,
            reply_to = %request.reply_address,
            "Translation request published"
        );

        match slot.wait(timeout).await {
            Ok(reply) => match reply {
                ReplyBody::Failed { error } => {
                    Translation::unavailable(UnavailableReason::WorkerError, error)
                }
                reply => match TranslationResponse::from_reply(&request, reply) {
                    Some(response) => Translation::Translated(response),
                    None => Translation::unavailable(UnavailableReason::WorkerError, "empty reply"),
                },
            },
            Err(RegistryError::TimedOut(after)) => Translation::unavailable(
                UnavailableReason::TimedOut,
                format!("no reply within {}ms", after.as_millis()),
            ),
            Err(RegistryError::Abandoned) => Translation::unavailable(
                UnavailableReason::ConnectionFailed,
                "call abandoned during shutdown",
            ),
        }
    }

    /// Close the broker link and fail every waiting call.
    pub async fn shutdown(&self) {
        let abandoned = self.registry.abandon_all();
        if abandoned > 0 {
            tracing::info!(abandoned, "Abandoned pending translation calls");
        }
        self.manager.shutdown().await;
    }
}

#[async_trait]
impl Translator for TranslationClient {
    async fn translate(
        &self,
        text: &str,
        target_language: &str,
        target_dialect: Option<&str>,
    ) -> Translation {
        self.translate_with_timeout(text, target_language, target_dialect, self.timeout)
            .await
    }
}

/// Route reply envelopes to the registry by correlation id.
fn reply_handler(registry: Arc<CorrelationRegistry<ReplyBody>>) -> EnvelopeHandler {
    Arc::new(move |envelope: Envelope| {
        let Some(correlation_id) = envelope.correlation_id() else {
            tracing::warn!("Dropping reply without correlation id");
            return;
        };

        let reply = serde_json::from_str::<ReplyBody>(&envelope.body).unwrap_or_else(|e| {
            ReplyBody::failed(format!("unparseable reply: {}", e))
        });

        if !registry.resolve(correlation_id, reply) {
            tracing::debug!(
                correlation_id = %correlation_id,
                "Ignoring reply for unknown or expired call"
            );
        }
    })
}
