//! Message broker abstraction.
//!
//! A broker moves JSON envelopes between named queues. Two transports:
//!
//! - [`RedisBroker`]: queues are Redis lists (`redis://`, `rediss://`)
//! - [`MemoryBroker`]: in-process queues for tests and single-node runs (`memory://`)
//!
//! [`ConnectionManager`] owns one live channel at a time and reconnects it
//! under a bounded retry policy.

mod manager;
mod memory;
mod redis_lists;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use manager::{BrokerLink, ConnectionManager, EnvelopeHandler, ReconnectPolicy};
pub use memory::MemoryBroker;
pub use redis_lists::RedisBroker;

use crate::config::BrokerSettings;

/// Prefix of private reply queue names.
pub const REPLY_QUEUE_PREFIX: &str = "rpc.reply.";

/// Broker errors.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("broker unreachable: {0}")]
    Unreachable(String),

    #[error("connection attempt timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("broker marked unavailable for another {0:?}")]
    CoolingDown(Duration),

    #[error("channel closed")]
    Closed,

    #[error("malformed envelope: {0}")]
    Envelope(#[from] serde_json::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("unsupported broker url: {0}")]
    UnsupportedUrl(String),
}

/// Message properties carried next to the body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Properties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

/// A message on the wire: properties plus an opaque (JSON) body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub properties: Properties,
    pub body: String,
}

impl Envelope {
    /// Build an envelope whose body is `body` serialized as JSON.
    pub fn json<T: Serialize>(body: &T, properties: Properties) -> Result<Self, BrokerError> {
        Ok(Self {
            properties,
            body: serde_json::to_string(body)?,
        })
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.properties.correlation_id.as_deref()
    }

    pub fn reply_to(&self) -> Option<&str> {
        self.properties.reply_to.as_deref()
    }

    pub(crate) fn encode(&self) -> Result<String, BrokerError> {
        Ok(serde_json::to_string(self)?)
    }

    pub(crate) fn decode(raw: &str) -> Result<Self, BrokerError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// An envelope reserved for manual acknowledgement.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub envelope: Envelope,
    pub queue: String,
    pub consumer: String,
    /// Encoded form, used to remove the delivery from the unacked list
    pub(crate) raw: String,
}

/// Name of the list holding deliveries reserved by `consumer`.
pub fn unacked_queue(queue: &str, consumer: &str) -> String {
    format!("{}:unacked:{}", queue, consumer)
}

/// Opens channels to a broker.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Open a new channel. Fails if the broker cannot be reached.
    async fn connect(&self) -> Result<Arc<dyn BrokerChannel>, BrokerError>;

    /// Transport name for logs.
    fn kind(&self) -> &'static str;
}

/// One live connection to a broker.
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Declare a shared queue. Idempotent.
    async fn declare_queue(&self, queue: &str) -> Result<(), BrokerError>;

    /// Declare a private reply queue with an unguessable name. It is owned
    /// by this channel and removed when the channel closes.
    async fn declare_exclusive_queue(&self) -> Result<String, BrokerError>;

    /// Publish to `queue`. Publishing to a queue nobody declared is dropped.
    async fn publish(&self, queue: &str, envelope: &Envelope) -> Result<(), BrokerError>;

    /// Take the next envelope (auto-ack), waiting at most `wait`.
    async fn consume(&self, queue: &str, wait: Duration) -> Result<Option<Envelope>, BrokerError>;

    /// Reserve the next envelope for `consumer` until it is acknowledged.
    ///
    /// A reserved element that does not decode is dropped from the unacked
    /// list and reported as [`BrokerError::Envelope`]; it is never redelivered.
    async fn reserve(
        &self,
        queue: &str,
        consumer: &str,
        wait: Duration,
    ) -> Result<Option<Delivery>, BrokerError>;

    /// Acknowledge a reserved delivery.
    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError>;

    /// Put deliveries `consumer` reserved but never acknowledged back on
    /// `queue`. Returns how many were requeued.
    async fn recover(&self, queue: &str, consumer: &str) -> Result<usize, BrokerError>;

    fn is_open(&self) -> bool;

    /// Close the channel and delete its exclusive queues.
    async fn close(&self);
}

/// Open the transport named by `settings.url`.
pub fn open_broker(settings: &BrokerSettings) -> Result<Arc<dyn Broker>, BrokerError> {
    let url = settings.url.trim();
    if url.starts_with("memory://") {
        Ok(Arc::new(MemoryBroker::new()))
    } else if url.starts_with("redis://") || url.starts_with("rediss://") {
        Ok(Arc::new(RedisBroker::open(url, settings)?))
    } else {
        Err(BrokerError::UnsupportedUrl(url.to_string()))
    }
}
