//! # Babel Chat
//!
//! Real-time one-to-one chat where every message is encrypted at rest and
//! translated into the receiver's language on the way through:
//! - Translation RPC over a message broker (Redis lists or in-process)
//! - WebSocket gateway with per-user rooms
//! - PostgreSQL for persistent storage
//!
//! ## Architecture
//!
//! - **Domain Layer**: entities, repository traits, the `Translator` seam
//! - **Application Layer**: the message relay and DTOs
//! - **Infrastructure Layer**: broker transports, RPC client and worker,
//!   encryption, repositories, metrics
//! - **Presentation Layer**: HTTP handlers and WebSocket gateway
//!
//! ## Module Structure
//!
//! ```text
//! babel_chat/
//! +-- config/         Configuration management
//! +-- domain/         Entities, value objects, and service traits
//! +-- application/    Message relay and DTOs
//! +-- infrastructure/ Broker, RPC, crypto, database, metrics
//! +-- presentation/   HTTP routes and WebSocket handlers
//! +-- shared/         Common utilities (errors, snowflake IDs)
//! ```

// Configuration module
pub mod config;

// Domain layer
pub mod domain;

// Application layer
pub mod application;

// Infrastructure layer
pub mod infrastructure;

// Presentation layer
pub mod presentation;

// Shared utilities
pub mod shared;

// Application startup and state management
pub mod startup;

// Telemetry and observability
pub mod telemetry;
