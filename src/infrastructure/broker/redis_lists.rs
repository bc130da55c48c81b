//! Redis list transport.
//!
//! A queue is a list: publish is `LPUSH`, consume is `RPOP`, so each list
//! is FIFO. Reservation for manual acknowledgement moves the element onto
//! `<queue>:unacked:<consumer>` with `LMOVE`; acknowledgement removes it
//! from there with `LREM`.
//!
//! Empty queues are polled rather than waited on with blocking pops, so one
//! multiplexed connection can serve publishers and the consumer together.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::MultiplexedConnection;
use redis::{Client, RedisError};
use tokio::time::Instant;
use tracing::instrument;
use uuid::Uuid;

use super::{
    unacked_queue, Broker, BrokerChannel, BrokerError, Delivery, Envelope, REPLY_QUEUE_PREFIX,
};
use crate::config::BrokerSettings;

/// Broker backed by Redis lists.
pub struct RedisBroker {
    client: Client,
    poll_interval: Duration,
    reply_ttl_secs: u64,
}

impl RedisBroker {
    pub fn open(url: &str, settings: &BrokerSettings) -> Result<Self, BrokerError> {
        Ok(Self {
            client: Client::open(url)?,
            poll_interval: Duration::from_millis(settings.poll_interval_ms.max(1)),
            reply_ttl_secs: settings.reply_queue_ttl_secs.max(1),
        })
    }
}

#[async_trait]
impl Broker for RedisBroker {
    #[instrument(skip(self))]
    async fn connect(&self) -> Result<Arc<dyn BrokerChannel>, BrokerError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BrokerError::Unreachable(e.to_string()))?;

        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| BrokerError::Unreachable(e.to_string()))?;

        Ok(Arc::new(RedisChannel {
            conn,
            open: AtomicBool::new(true),
            exclusive: Mutex::new(Vec::new()),
            poll_interval: self.poll_interval,
            reply_ttl_secs: self.reply_ttl_secs,
        }))
    }

    fn kind(&self) -> &'static str {
        "redis"
    }
}

struct RedisChannel {
    conn: MultiplexedConnection,
    open: AtomicBool,
    exclusive: Mutex<Vec<String>>,
    poll_interval: Duration,
    reply_ttl_secs: u64,
}

impl RedisChannel {
    fn connection(&self) -> Result<MultiplexedConnection, BrokerError> {
        if self.is_open() {
            Ok(self.conn.clone())
        } else {
            Err(BrokerError::Closed)
        }
    }

    /// Mark the channel dead when the connection itself failed.
    fn check(&self, err: RedisError) -> BrokerError {
        if err.is_io_error() || err.is_connection_dropped() || err.is_timeout() {
            tracing::warn!(error = %err, "Redis connection lost");
            self.open.store(false, Ordering::SeqCst);
        }
        BrokerError::Redis(err)
    }

    fn is_exclusive(&self, queue: &str) -> bool {
        self.exclusive.lock().iter().any(|q| q == queue)
    }

    /// Remove one reserved element from the unacked list.
    async fn unpark(&self, park: &str, raw: &str) -> Result<(), BrokerError> {
        let mut conn = self.connection()?;
        redis::cmd("LREM")
            .arg(park)
            .arg(1)
            .arg(raw)
            .query_async::<i64>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| self.check(e))
    }

    /// Pop one raw envelope, polling until `wait` elapses.
    async fn poll(
        &self,
        wait: Duration,
        mut cmd: impl FnMut() -> redis::Cmd,
    ) -> Result<Option<String>, BrokerError> {
        let deadline = Instant::now() + wait;
        loop {
            let mut conn = self.connection()?;
            let raw: Option<String> = cmd()
                .query_async(&mut conn)
                .await
                .map_err(|e| self.check(e))?;
            if raw.is_some() {
                return Ok(raw);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval.min(deadline.saturating_duration_since(now))).await;
        }
    }
}

#[async_trait]
impl BrokerChannel for RedisChannel {
    async fn declare_queue(&self, _queue: &str) -> Result<(), BrokerError> {
        // Lists spring into existence on first push.
        self.connection().map(|_| ())
    }

    async fn declare_exclusive_queue(&self) -> Result<String, BrokerError> {
        self.connection()?;
        let name = format!("{}{}", REPLY_QUEUE_PREFIX, Uuid::new_v4());
        self.exclusive.lock().push(name.clone());
        Ok(name)
    }

    #[instrument(skip(self, envelope), fields(correlation_id = ?envelope.correlation_id()))]
    async fn publish(&self, queue: &str, envelope: &Envelope) -> Result<(), BrokerError> {
        let mut conn = self.connection()?;
        let raw = envelope.encode()?;

        let mut pipe = redis::pipe();
        pipe.atomic().cmd("LPUSH").arg(queue).arg(&raw).ignore();
        if queue.starts_with(REPLY_QUEUE_PREFIX) {
            // Replies to a caller that went away expire on their own.
            pipe.cmd("EXPIRE").arg(queue).arg(self.reply_ttl_secs).ignore();
        }

        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(|e| self.check(e))
    }

    async fn consume(&self, queue: &str, wait: Duration) -> Result<Option<Envelope>, BrokerError> {
        if self.is_exclusive(queue) {
            let mut conn = self.connection()?;
            redis::cmd("EXPIRE")
                .arg(queue)
                .arg(self.reply_ttl_secs)
                .query_async::<i64>(&mut conn)
                .await
                .map_err(|e| self.check(e))?;
        }

        let raw = self
            .poll(wait, || {
                let mut cmd = redis::cmd("RPOP");
                cmd.arg(queue);
                cmd
            })
            .await?;

        raw.map(|raw| Envelope::decode(&raw)).transpose()
    }

    async fn reserve(
        &self,
        queue: &str,
        consumer: &str,
        wait: Duration,
    ) -> Result<Option<Delivery>, BrokerError> {
        let park = unacked_queue(queue, consumer);
        let raw = self
            .poll(wait, || {
                let mut cmd = redis::cmd("LMOVE");
                cmd.arg(queue).arg(&park).arg("RIGHT").arg("LEFT");
                cmd
            })
            .await?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        let envelope = match Envelope::decode(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.unpark(&park, &raw).await?;
                tracing::warn!(queue = %queue, error = %e, "Dropped undecodable delivery");
                return Err(e);
            }
        };

        Ok(Some(Delivery {
            envelope,
            queue: queue.to_string(),
            consumer: consumer.to_string(),
            raw,
        }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        self.unpark(&unacked_queue(&delivery.queue, &delivery.consumer), &delivery.raw)
            .await
    }

    #[instrument(skip(self))]
    async fn recover(&self, queue: &str, consumer: &str) -> Result<usize, BrokerError> {
        let park = unacked_queue(queue, consumer);
        let mut requeued = 0;
        loop {
            let mut conn = self.connection()?;
            let moved: Option<String> = redis::cmd("LMOVE")
                .arg(&park)
                .arg(queue)
                .arg("LEFT")
                .arg("RIGHT")
                .query_async(&mut conn)
                .await
                .map_err(|e| self.check(e))?;
            if moved.is_none() {
                return Ok(requeued);
            }
            requeued += 1;
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        let queues: Vec<String> = std::mem::take(&mut *self.exclusive.lock());
        if !self.open.swap(false, Ordering::SeqCst) {
            return;
        }

        if queues.is_empty() {
            return;
        }

        let mut conn = self.conn.clone();
        if let Err(e) = redis::cmd("DEL").arg(&queues).query_async::<i64>(&mut conn).await {
            tracing::debug!(error = %e, "Failed to delete reply queues on close");
        }
    }
}
