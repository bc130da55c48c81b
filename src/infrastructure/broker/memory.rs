//! In-process broker.
//!
//! Queues are string lists guarded by a mutex, with the same semantics as
//! the Redis transport. Adds fault injection for tests: refuse new
//! connections, or sever every live channel at once.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

use super::{
    unacked_queue, Broker, BrokerChannel, BrokerError, Delivery, Envelope, REPLY_QUEUE_PREFIX,
};

#[derive(Default)]
struct State {
    queues: HashMap<String, VecDeque<String>>,
    /// exclusive queue -> owning channel id
    exclusive: HashMap<String, u64>,
}

impl State {
    fn remove_exclusive(&mut self, owner: Option<u64>) {
        let doomed: Vec<String> = self
            .exclusive
            .iter()
            .filter(|(_, id)| owner.map_or(true, |o| **id == o))
            .map(|(name, _)| name.clone())
            .collect();
        for name in doomed {
            self.exclusive.remove(&name);
            self.queues.remove(&name);
        }
    }
}

struct Shared {
    state: Mutex<State>,
    notify: Notify,
    available: AtomicBool,
    /// Bumped by `sever_connections`; channels from older generations are dead
    generation: AtomicU64,
    next_channel: AtomicU64,
}

/// In-process broker. Clones share the same queues.
#[derive(Clone)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                notify: Notify::new(),
                available: AtomicBool::new(true),
                generation: AtomicU64::new(0),
                next_channel: AtomicU64::new(1),
            }),
        }
    }

    /// Refuse (`false`) or accept (`true`) new connections.
    pub fn set_available(&self, available: bool) {
        self.shared.available.store(available, Ordering::SeqCst);
    }

    /// Close every live channel, as if the broker restarted.
    pub fn sever_connections(&self) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        self.shared.state.lock().remove_exclusive(None);
        self.shared.notify.notify_waiters();
    }

    /// Number of envelopes waiting in `queue`.
    pub fn queue_len(&self, queue: &str) -> usize {
        self.shared
            .state
            .lock()
            .queues
            .get(queue)
            .map_or(0, VecDeque::len)
    }

    /// Whether `queue` exists.
    pub fn has_queue(&self, queue: &str) -> bool {
        self.shared.state.lock().queues.contains_key(queue)
    }

    /// Push a raw element that skips envelope encoding, as a foreign or
    /// corrupted producer would.
    pub fn push_raw(&self, queue: &str, raw: &str) {
        self.shared
            .state
            .lock()
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_front(raw.to_string());
        self.shared.notify.notify_waiters();
    }

    /// Discard everything waiting in `queue`; returns how many were dropped.
    pub fn purge(&self, queue: &str) -> usize {
        self.shared
            .state
            .lock()
            .queues
            .get_mut(queue)
            .map_or(0, |list| list.drain(..).count())
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn connect(&self) -> Result<Arc<dyn BrokerChannel>, BrokerError> {
        if !self.shared.available.load(Ordering::SeqCst) {
            return Err(BrokerError::Unreachable("memory broker is down".into()));
        }

        Ok(Arc::new(MemoryChannel {
            id: self.shared.next_channel.fetch_add(1, Ordering::SeqCst),
            generation: self.shared.generation.load(Ordering::SeqCst),
            closed: AtomicBool::new(false),
            shared: Arc::clone(&self.shared),
        }))
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

struct MemoryChannel {
    id: u64,
    generation: u64,
    closed: AtomicBool,
    shared: Arc<Shared>,
}

impl MemoryChannel {
    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(BrokerError::Closed)
        }
    }

    fn unpark(&self, park: &str, raw: &str) {
        let mut state = self.shared.state.lock();
        if let Some(list) = state.queues.get_mut(park) {
            if let Some(pos) = list.iter().position(|parked| parked == raw) {
                list.remove(pos);
            }
        }
    }

    /// Pop from the consuming end of `queue`, optionally parking the raw
    /// envelope on `park` (the unacked list).
    async fn take(
        &self,
        queue: &str,
        park: Option<&str>,
        wait: Duration,
    ) -> Result<Option<String>, BrokerError> {
        let deadline = Instant::now() + wait;
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            self.ensure_open()?;
            {
                let mut state = self.shared.state.lock();
                let raw = state.queues.get_mut(queue).and_then(VecDeque::pop_back);
                if let Some(raw) = raw {
                    if let Some(park) = park {
                        state
                            .queues
                            .entry(park.to_string())
                            .or_default()
                            .push_front(raw.clone());
                    }
                    return Ok(Some(raw));
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }
}

#[async_trait]
impl BrokerChannel for MemoryChannel {
    async fn declare_queue(&self, queue: &str) -> Result<(), BrokerError> {
        self.ensure_open()?;
        self.shared
            .state
            .lock()
            .queues
            .entry(queue.to_string())
            .or_default();
        Ok(())
    }

    async fn declare_exclusive_queue(&self) -> Result<String, BrokerError> {
        self.ensure_open()?;
        let name = format!("{}{}", REPLY_QUEUE_PREFIX, Uuid::new_v4());
        let mut state = self.shared.state.lock();
        state.queues.insert(name.clone(), VecDeque::new());
        state.exclusive.insert(name.clone(), self.id);
        Ok(name)
    }

    async fn publish(&self, queue: &str, envelope: &Envelope) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let raw = envelope.encode()?;
        let delivered = match self.shared.state.lock().queues.get_mut(queue) {
            Some(list) => {
                list.push_front(raw);
                true
            }
            None => false,
        };

        if delivered {
            self.shared.notify.notify_waiters();
        } else {
            tracing::debug!(queue = %queue, "Dropped envelope for undeclared queue");
        }
        Ok(())
    }

    async fn consume(&self, queue: &str, wait: Duration) -> Result<Option<Envelope>, BrokerError> {
        match self.take(queue, None, wait).await? {
            Some(raw) => Ok(Some(Envelope::decode(&raw)?)),
            None => Ok(None),
        }
    }

    async fn reserve(
        &self,
        queue: &str,
        consumer: &str,
        wait: Duration,
    ) -> Result<Option<Delivery>, BrokerError> {
        let park = unacked_queue(queue, consumer);
        let Some(raw) = self.take(queue, Some(&park), wait).await? else {
            return Ok(None);
        };

        let envelope = match Envelope::decode(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.unpark(&park, &raw);
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
        self.ensure_open()?;
        self.unpark(&unacked_queue(&delivery.queue, &delivery.consumer), &delivery.raw);
        Ok(())
    }

    async fn recover(&self, queue: &str, consumer: &str) -> Result<usize, BrokerError> {
        self.ensure_open()?;
        let park = unacked_queue(queue, consumer);
        let requeued = {
            let mut state = self.shared.state.lock();
            let Some(mut parked) = state.queues.remove(&park) else {
                return Ok(0);
            };
            let target = state.queues.entry(queue.to_string()).or_default();
            let count = parked.len();
            // Newest reservation sits at the front; the oldest ends up next in line.
            while let Some(raw) = parked.pop_front() {
                target.push_back(raw);
            }
            count
        };

        if requeued > 0 {
            self.shared.notify.notify_waiters();
        }
        Ok(requeued)
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
            && self.generation == self.shared.generation.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.state.lock().remove_exclusive(Some(self.id));
        self.shared.notify.notify_waiters();
    }
}
