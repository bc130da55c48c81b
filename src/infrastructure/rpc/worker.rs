//! Translation worker.
//!
//! Consumes the shared request queue one delivery at a time (prefetch 1),
//! runs the engine, publishes the reply to the request's `reply_to` with
//! the request's correlation id, and only then acknowledges. A worker that
//! dies between reserve and ack gets the delivery back on its next start.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;

use super::engine::TranslationEngine;
use crate::config::Settings;
use crate::domain::services::LanguageDetector;
use crate::domain::value_objects::{ReplyBody, RequestBody};
use crate::infrastructure::broker::{
    Broker, BrokerChannel, BrokerError, Delivery, Envelope, Properties, ReconnectPolicy,
};
use crate::infrastructure::metrics;

/// How long one reserve call waits before re-checking shutdown.
const RESERVE_WAIT: Duration = Duration::from_secs(1);

/// Worker identity and queue.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub request_queue: String,
    pub consumer_tag: String,
    pub policy: ReconnectPolicy,
}

impl From<&Settings> for WorkerConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            request_queue: settings.broker.request_queue.clone(),
            consumer_tag: settings.worker.consumer_tag.clone(),
            policy: ReconnectPolicy::from(&settings.broker),
        }
    }
}

pub struct TranslationWorker {
    broker: Arc<dyn Broker>,
    engine: Arc<dyn TranslationEngine>,
    detector: LanguageDetector,
    config: WorkerConfig,
}

impl TranslationWorker {
    pub fn new(
        broker: Arc<dyn Broker>,
        engine: Arc<dyn TranslationEngine>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            broker,
            engine,
            detector: LanguageDetector::new(),
            config,
        }
    }

    /// Serve requests until `shutdown` completes.
    ///
    /// The request being processed when shutdown fires is finished and
    /// acknowledged first. Returns an error once the broker stays
    /// unreachable for a whole retry budget.
    pub async fn run<F>(&self, shutdown: F) -> Result<(), BrokerError>
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);

        loop {
            let channel = tokio::select! {
                _ = &mut shutdown => return Ok(()),
                channel = self.connect() => channel?,
            };

            channel.declare_queue(&self.config.request_queue).await?;
            let requeued = channel
                .recover(&self.config.request_queue, &self.config.consumer_tag)
                .await?;
            if requeued > 0 {
                tracing::info!(requeued, "Requeued unacknowledged requests");
            }

            tracing::info!(
                queue = %self.config.request_queue,
                consumer_tag = %self.config.consumer_tag,
                "Awaiting translation requests"
            );

            loop {
                let reserved = tokio::select! {
                    _ = &mut shutdown => {
                        tracing::info!("Worker shutting down");
                        channel.close().await;
                        return Ok(());
                    }
                    reserved = channel.reserve(
                        &self.config.request_queue,
                        &self.config.consumer_tag,
                        RESERVE_WAIT,
                    ) => reserved,
                };

                match reserved {
                    Ok(Some(delivery)) => {
                        if let Err(e) = self.handle(channel.as_ref(), &delivery).await {
                            tracing::warn!(error = %e, "Lost broker while handling request");
                            break;
                        }
                    }
                    Ok(None) if channel.is_open() => {}
                    Ok(None) => break,
                    Err(BrokerError::Envelope(e)) => {
                        tracing::debug!(error = %e, "Undecodable request dropped");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Broker channel failed");
                        break;
                    }
                }
            }

            channel.close().await;
            tracing::info!("Reconnecting to broker");
        }
    }

    /// Answer one delivery, then acknowledge it.
    #[instrument(skip(self, channel, delivery), fields(correlation_id = ?delivery.envelope.correlation_id()))]
    async fn handle(&self, channel: &dyn BrokerChannel, delivery: &Delivery) -> Result<(), BrokerError> {
        let envelope = &delivery.envelope;

        match envelope.reply_to() {
            Some(reply_to) => {
                let reply = self.process(&envelope.body).await;
                let outcome = match &reply {
                    ReplyBody::Translated { .. } => "translated",
                    ReplyBody::Failed { .. } => "failed",
                };

                let reply = Envelope::json(
                    &reply,
                    Properties {
                        correlation_id: envelope.properties.correlation_id.clone(),
                        reply_to: None,
                    },
                )?;
                channel.publish(reply_to, &reply).await?;
                tracing::debug!(reply_to = %reply_to, outcome, "Reply published");
            }
            None => {
                tracing::warn!("Request without reply_to; acknowledging without reply");
            }
        }

        channel.ack(delivery).await
    }

    /// Turn one request body into a reply body.
    pub async fn process(&self, body: &str) -> ReplyBody {
        let request: RequestBody = match serde_json::from_str(body) {
            Ok(request) => request,
            Err(e) => return ReplyBody::failed(format!("malformed request: {}", e)),
        };

        let detected = self.detector.detect(&request.text);
        match self
            .engine
            .translate(
                &request.text,
                &request.target_language,
                request.target_dialect.as_deref(),
            )
            .await
        {
            Ok(response) => ReplyBody::Translated {
                response,
                source_language: detected.is_determined().then(|| detected.language.clone()),
                source_dialect: detected.is_determined().then(|| detected.dialect.clone()),
            },
            Err(e) => {
                tracing::error!(error = %e, "Translation engine failed");
                ReplyBody::failed(e.to_string())
            }
        }
    }

    async fn connect(&self) -> Result<Arc<dyn BrokerChannel>, BrokerError> {
        let policy = &self.config.policy;
        let mut last_error = BrokerError::Closed;

        for attempt in 1..=policy.attempts {
            match tokio::time::timeout(policy.connect_timeout, self.broker.connect()).await {
                Ok(Ok(channel)) => {
                    metrics::record_broker_connection("connected");
                    return Ok(channel);
                }
                Ok(Err(e)) => last_error = e,
                Err(_) => last_error = BrokerError::ConnectTimeout(policy.connect_timeout),
            }

            metrics::record_broker_connection("failed");
            tracing::warn!(
                attempt,
                max_attempts = policy.attempts,
                error = %last_error,
                "Worker failed to connect to broker"
            );
            if attempt < policy.attempts {
                tokio::time::sleep(policy.delay).await;
            }
        }

        Err(BrokerError::Unreachable(format!(
            "gave up after {} attempts: {}",
            policy.attempts, last_error
        )))
    }
}
