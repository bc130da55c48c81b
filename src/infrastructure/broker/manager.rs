//! Broker connection manager.
//!
//! Owns at most one live channel plus its private reply queue and the single
//! consume loop that drains it. Callers ask for a live link with
//! [`ConnectionManager::ensure_connected`]; a dead link is torn down and
//! replaced under a bounded retry policy.
//!
//! ```text
//!   Disconnected ──ensure_connected──▶ Connecting ──ok──▶ Connected
//!        ▲                               │ attempts exhausted
//!        │                               ▼
//!        └──── cooldown elapsed ──── CoolingDown (fail fast)
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{Broker, BrokerChannel, BrokerError, Envelope};
use crate::config::BrokerSettings;
use crate::infrastructure::metrics;

/// How long one consume call waits before the loop re-checks the channel.
const CONSUME_WAIT: Duration = Duration::from_secs(1);

/// Callback invoked for every envelope arriving on the reply queue.
pub type EnvelopeHandler = Arc<dyn Fn(Envelope) + Send + Sync>;

/// Bounded reconnect policy.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Connection attempts per reconnect
    pub attempts: u32,
    /// Fixed delay between attempts
    pub delay: Duration,
    /// Upper bound for one attempt
    pub connect_timeout: Duration,
    /// Fail-fast window after all attempts failed
    pub cooldown: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(3),
            cooldown: Duration::from_secs(10),
        }
    }
}

impl From<&BrokerSettings> for ReconnectPolicy {
    fn from(settings: &BrokerSettings) -> Self {
        Self {
            attempts: settings.reconnect_attempts.max(1),
            delay: Duration::from_millis(settings.reconnect_delay_ms),
            connect_timeout: Duration::from_millis(settings.connect_timeout_ms),
            cooldown: Duration::from_millis(settings.failure_cooldown_ms),
        }
    }
}

/// A live connection: channel, private reply queue and its consume loop.
pub struct BrokerLink {
    channel: Arc<dyn BrokerChannel>,
    reply_queue: String,
    consumer: JoinHandle<()>,
}

impl BrokerLink {
    /// Private queue replies for this link must be addressed to.
    pub fn reply_queue(&self) -> &str {
        &self.reply_queue
    }

    pub fn channel(&self) -> &Arc<dyn BrokerChannel> {
        &self.channel
    }

    /// The channel is open and its consume loop still runs.
    pub fn is_live(&self) -> bool {
        self.channel.is_open() && !self.consumer.is_finished()
    }

    pub async fn publish(&self, queue: &str, envelope: &Envelope) -> Result<(), BrokerError> {
        self.channel.publish(queue, envelope).await
    }

    async fn shutdown(&self) {
        self.channel.close().await;
        self.consumer.abort();
    }
}

/// Connection manager: one live link, reconnected on demand.
pub struct ConnectionManager {
    broker: Arc<dyn Broker>,
    policy: ReconnectPolicy,
    /// Shared queues declared on every new connection
    queues: Vec<String>,
    handler: EnvelopeHandler,
    link: RwLock<Option<Arc<BrokerLink>>>,
    /// Serializes reconnects so concurrent callers share one attempt
    reconnecting: tokio::sync::Mutex<()>,
    failed_until: Mutex<Option<Instant>>,
}

impl ConnectionManager {
    pub fn new(
        broker: Arc<dyn Broker>,
        policy: ReconnectPolicy,
        queues: Vec<String>,
        handler: EnvelopeHandler,
    ) -> Self {
        Self {
            broker,
            policy,
            queues,
            handler,
            link: RwLock::new(None),
            reconnecting: tokio::sync::Mutex::new(()),
            failed_until: Mutex::new(None),
        }
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Whether a live link exists right now. Never connects.
    pub fn is_connected(&self) -> bool {
        self.live_link().is_some()
    }

    /// Return the live link, reconnecting if needed.
    ///
    /// Fails with `Unreachable` once every attempt of the policy failed, and
    /// with `CoolingDown` for calls made during the cooldown that follows.
    pub async fn ensure_connected(&self) -> Result<Arc<BrokerLink>, BrokerError> {
        if let Some(link) = self.live_link() {
            return Ok(link);
        }
        self.check_cooldown()?;

        let _guard = self.reconnecting.lock().await;

        // Another caller may have finished reconnecting while we waited.
        if let Some(link) = self.live_link() {
            return Ok(link);
        }
        self.check_cooldown()?;

        self.teardown().await;

        let mut last_error = BrokerError::Closed;
        for attempt in 1..=self.policy.attempts {
            match tokio::time::timeout(self.policy.connect_timeout, self.open_link()).await {
                Ok(Ok(link)) => {
                    let link = Arc::new(link);
                    *self.link.write() = Some(Arc::clone(&link));
                    *self.failed_until.lock() = None;
                    metrics::record_broker_connection("connected");
                    tracing::info!(
                        broker = self.broker.kind(),
                        reply_queue = %link.reply_queue(),
                        attempt,
                        "Broker connection established"
                    );
                    return Ok(link);
                }
                Ok(Err(e)) => last_error = e,
                Err(_) => last_error = BrokerError::ConnectTimeout(self.policy.connect_timeout),
            }

            metrics::record_broker_connection("failed");
            tracing::warn!(
                broker = self.broker.kind(),
                attempt,
                max_attempts = self.policy.attempts,
                error = %last_error,
                "Broker connection attempt failed"
            );

            if attempt < self.policy.attempts {
                tokio::time::sleep(self.policy.delay).await;
            }
        }

        *self.failed_until.lock() = Some(Instant::now() + self.policy.cooldown);
        tracing::error!(
            broker = self.broker.kind(),
            attempts = self.policy.attempts,
            cooldown_ms = self.policy.cooldown.as_millis() as u64,
            "Broker unreachable, giving up until cooldown ends"
        );

        Err(BrokerError::Unreachable(format!(
            "gave up after {} attempts: {}",
            self.policy.attempts, last_error
        )))
    }

    /// Drop `link` if it is still the current one, so the next call
    /// reconnects.
    pub async fn invalidate(&self, link: &Arc<BrokerLink>) {
        let stale = {
            let mut current = self.link.write();
            match current.as_ref() {
                Some(existing) if Arc::ptr_eq(existing, link) => current.take(),
                _ => None,
            }
        };

        if let Some(stale) = stale {
            tracing::debug!(reply_queue = %stale.reply_queue(), "Invalidated broker link");
            stale.shutdown().await;
        }
    }

    /// Close the current link.
    pub async fn shutdown(&self) {
        self.teardown().await;
    }

    fn live_link(&self) -> Option<Arc<BrokerLink>> {
        self.link
            .read()
            .as_ref()
            .filter(|link| link.is_live())
            .cloned()
    }

    fn check_cooldown(&self) -> Result<(), BrokerError> {
        let mut failed_until = self.failed_until.lock();
        match *failed_until {
            Some(until) if Instant::now() < until => {
                metrics::record_broker_connection("cooldown");
                Err(BrokerError::CoolingDown(until.saturating_duration_since(Instant::now())))
            }
            Some(_) => {
                *failed_until = None;
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn teardown(&self) {
        let old = self.link.write().take();
        if let Some(old) = old {
            tracing::info!(reply_queue = %old.reply_queue(), "Tearing down broker link");
            old.shutdown().await;
        }
    }

    async fn open_link(&self) -> Result<BrokerLink, BrokerError> {
        let channel = self.broker.connect().await?;
        for queue in &self.queues {
            channel.declare_queue(queue).await?;
        }
        let reply_queue = channel.declare_exclusive_queue().await?;

        let consumer = tokio::spawn(consume_loop(
            Arc::clone(&channel),
            reply_queue.clone(),
            Arc::clone(&self.handler),
        ));

        Ok(BrokerLink {
            channel,
            reply_queue,
            consumer,
        })
    }
}

/// Drain the reply queue into the handler until the channel fails.
async fn consume_loop(channel: Arc<dyn BrokerChannel>, queue: String, handler: EnvelopeHandler) {
    tracing::debug!(queue = %queue, "Reply consumer started");
    loop {
        match channel.consume(&queue, CONSUME_WAIT).await {
            Ok(Some(envelope)) => handler(envelope),
            Ok(None) if channel.is_open() => {}
            Ok(None) => break,
            Err(BrokerError::Envelope(e)) => {
                tracing::warn!(queue = %queue, error = %e, "Discarding malformed envelope");
            }
            Err(e) => {
                tracing::warn!(queue = %queue, error = %e, "Reply consumer stopped");
                break;
            }
        }
    }
    tracing::debug!(queue = %queue, "Reply consumer exited");
}
