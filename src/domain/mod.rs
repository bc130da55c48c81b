//! # Domain Layer
//!
//! Core types of the translating chat relay, independent of the broker,
//! database and web framework that carry them.
//!
//! ## Structure
//!
//! - **entities**: `User`, `ChatMessage` and `Contact` plus their repository traits
//! - **value_objects**: translation request/response and broker wire bodies
//! - **services**: the `Translator` seam and the language detector

pub mod entities;
pub mod services;
pub mod value_objects;

pub use entities::*;
pub use services::*;
pub use value_objects::*;
