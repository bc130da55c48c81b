//! Repository Implementations
//!
//! PostgreSQL implementations of the repository traits defined in the
//! domain layer.
//!
//! - **PgUserRepository** - users and their language preferences
//! - **PgContactRepository** - per-user contact lists
//! - **PgMessageRepository** - encrypted messages and their translations

pub mod contact_repository;
pub mod message_repository;
pub mod user_repository;

pub use contact_repository::PgContactRepository;
pub use message_repository::PgMessageRepository;
pub use user_repository::PgUserRepository;
