//! Snowflake ID Generator
//!
//! Time-ordered 63-bit identifiers for chat messages: 41 bits of
//! milliseconds since a configurable epoch, 10 bits of machine id and
//! 12 bits of per-millisecond sequence.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Default epoch (2024-01-01T00:00:00.000Z)
pub const DEFAULT_EPOCH: u64 = 1_704_067_200_000;

const MACHINE_BITS: u64 = 10;
const SEQUENCE_BITS: u64 = 12;
const MACHINE_MASK: u64 = (1 << MACHINE_BITS) - 1;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;

/// Snowflake ID generator
///
/// The last issued (timestamp, sequence) pair lives in a single atomic so
/// concurrent callers never hand out the same id. When a millisecond's
/// sequence space is exhausted the generator borrows from the next
/// millisecond instead of spinning.
pub struct SnowflakeGenerator {
    machine_id: u64,
    epoch: u64,
    state: AtomicU64,
}

impl SnowflakeGenerator {
    /// Create a new snowflake generator
    pub fn new(machine_id: u16, epoch: u64) -> Self {
        Self {
            machine_id: machine_id as u64 & MACHINE_MASK,
            epoch,
            state: AtomicU64::new(0),
        }
    }

    /// Generate a new snowflake ID
    pub fn generate(&self) -> i64 {
        let now = self.current_timestamp();
        let mut state = self.state.load(Ordering::Acquire);

        loop {
            let last_timestamp = state >> SEQUENCE_BITS;
            let last_sequence = state & SEQUENCE_MASK;

            let (timestamp, sequence) = if now > last_timestamp {
                (now, 0)
            } else if last_sequence < SEQUENCE_MASK {
                (last_timestamp, last_sequence + 1)
            } else {
                (last_timestamp + 1, 0)
            };

            let next = (timestamp << SEQUENCE_BITS) | sequence;
            match self
                .state
                .compare_exchange_weak(state, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return self.compose(timestamp, sequence),
                Err(actual) => state = actual,
            }
        }
    }

    /// Extract the unix timestamp (milliseconds) embedded in an id
    pub fn timestamp_of(&self, snowflake: i64) -> u64 {
        ((snowflake as u64) >> (MACHINE_BITS + SEQUENCE_BITS)) + self.epoch
    }

    fn compose(&self, timestamp: u64, sequence: u64) -> i64 {
        let elapsed = timestamp.saturating_sub(self.epoch);
        ((elapsed << (MACHINE_BITS + SEQUENCE_BITS)) | (self.machine_id << SEQUENCE_BITS) | sequence)
            as i64
    }

    fn current_timestamp(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(self.epoch)
    }
}
