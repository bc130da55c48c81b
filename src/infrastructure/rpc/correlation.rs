//! Correlation registry.
//!
//! Maps correlation ids of in-flight calls to the one-shot slot their caller
//! waits on. Each id is resolved at most once; resolving an id that is
//! unknown, already resolved or abandoned is a silent no-op, which absorbs
//! duplicate and late replies.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Errors while waiting on a slot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("no reply within {0:?}")]
    TimedOut(Duration),

    #[error("call abandoned before a reply arrived")]
    Abandoned,
}

struct PendingCall<T> {
    sender: oneshot::Sender<T>,
    registered_at: Instant,
}

/// Registry of in-flight calls keyed by correlation id.
pub struct CorrelationRegistry<T> {
    pending: DashMap<String, PendingCall<T>>,
}

impl<T: Send + 'static> CorrelationRegistry<T> {
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
        }
    }

    /// Register a new call under a fresh random id.
    pub fn register(self: &Arc<Self>) -> (String, PendingSlot<T>) {
        let (sender, receiver) = oneshot::channel();
        let registered_at = Instant::now();

        // v4 ids are random; a collision means the RNG is broken.
        let id = loop {
            let candidate = Uuid::new_v4().to_string();
            if !self.pending.contains_key(&candidate) {
                break candidate;
            }
        };

        self.pending.insert(
            id.clone(),
            PendingCall {
                sender,
                registered_at,
            },
        );

        let slot = PendingSlot {
            id: id.clone(),
            receiver: Some(receiver),
            registered_at,
            registry: Arc::clone(self),
        };
        (id, slot)
    }

    /// Deliver `value` to the caller waiting on `id`.
    ///
    /// Returns `false` if no such call is pending or its caller is gone.
    pub fn resolve(&self, id: &str, value: T) -> bool {
        match self.pending.remove(id) {
            Some((_, call)) => {
                tracing::trace!(
                    correlation_id = %id,
                    waited_ms = call.registered_at.elapsed().as_millis() as u64,
                    "Resolved pending call"
                );
                call.sender.send(value).is_ok()
            }
            None => false,
        }
    }

    /// Drop every pending call; their waiters see `Abandoned`.
    pub fn abandon_all(&self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }

    pub fn contains(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn forget(&self, id: &str) {
        self.pending.remove(id);
    }
}

impl<T: Send + 'static> Default for CorrelationRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The waiting side of one registered call.
///
/// Dropping the slot, whether after a timeout or because the caller was
/// cancelled, removes the registry entry.
pub struct PendingSlot<T: Send + 'static> {
    id: String,
    receiver: Option<oneshot::Receiver<T>>,
    registered_at: Instant,
    registry: Arc<CorrelationRegistry<T>>,
}

impl<T: Send + 'static> PendingSlot<T> {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Time since the call was registered.
    pub fn elapsed(&self) -> Duration {
        self.registered_at.elapsed()
    }

    /// Wait for the value, at most `timeout`.
    pub async fn wait(mut self, timeout: Duration) -> Result<T, RegistryError> {
        let Some(receiver) = self.receiver.take() else {
            return Err(RegistryError::Abandoned);
        };

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(RegistryError::Abandoned),
            Err(_) => Err(RegistryError::TimedOut(timeout)),
        }
    }
}

impl<T: Send + 'static> Drop for PendingSlot<T> {
    fn drop(&mut self) {
        self.registry.forget(&self.id);
    }
}
