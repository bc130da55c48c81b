//! # Configuration Module
//!
//! This module handles application configuration loading and management.
//! Configuration can be loaded from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{environment}.toml)
//! - .env files (via dotenvy)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use babel_chat::config::Settings;
//!
//! let settings = Settings::load()?;
//! println!("Translation requests go to {}", settings.broker.request_queue);
//! ```

mod settings;

pub use settings::*;
