//! Infrastructure Layer
//!
//! Implementations for external services:
//! - Message broker transports and the connection manager
//! - Translation RPC client, worker and engine
//! - Encryption at rest
//! - Database repositories (PostgreSQL)
//! - Prometheus metrics

pub mod broker;
pub mod crypto;
pub mod database;
pub mod metrics;
pub mod repositories;
pub mod rpc;
