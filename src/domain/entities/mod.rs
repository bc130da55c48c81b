//! # Domain Entities
//!
//! - **User**: a chat participant with a preferred language and dialect
//! - **ChatMessage**: a direct message, encrypted at rest, optionally translated
//! - **Contact**: a user on another user's contact list
//!
//! Each entity has a repository trait; PostgreSQL implementations live in
//! the infrastructure layer.

mod contact;
mod message;
mod user;

pub use contact::{Contact, ContactRepository};
pub use message::{ChatMessage, MessageRepository};
pub use user::{User, UserRepository};

#[cfg(test)]
pub use contact::MockContactRepository;
#[cfg(test)]
pub use message::MockMessageRepository;
#[cfg(test)]
pub use user::MockUserRepository;
