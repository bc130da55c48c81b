//! Application Layer
//!
//! Use cases that coordinate the domain, the translation RPC and the
//! real-time gateway, plus the DTOs exchanged with clients.

pub mod dto;
pub mod services;
