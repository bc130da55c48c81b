//! Translation RPC over the message broker.
//!
//! - **correlation**: matches replies to waiting callers
//! - **client**: request side, implements the `Translator` seam
//! - **worker**: reply side, consumes the shared request queue
//! - **engine**: the model backend the worker calls

pub mod client;
pub mod correlation;
pub mod engine;
pub mod worker;

pub use client::TranslationClient;
pub use correlation::{CorrelationRegistry, PendingSlot, RegistryError};
pub use engine::{EngineError, OllamaEngine, TranslationEngine};
pub use worker::{TranslationWorker, WorkerConfig};
