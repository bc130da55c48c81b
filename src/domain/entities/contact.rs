//! Contact entity and repository trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::User;
use crate::shared::error::AppError;

/// A user on someone's contact list.
///
/// Maps to the `contacts` table joined with `users`:
/// - owner_id: BIGINT REFERENCES users(id)
/// - contact_id: BIGINT REFERENCES users(id)
/// - created_at: TIMESTAMPTZ NOT NULL DEFAULT NOW()
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub owner_id: i64,
    pub user: User,
    pub added_at: DateTime<Utc>,
}

/// Repository trait for contact lists.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContactRepository: Send + Sync {
    /// Add `contact_id` to `owner_id`'s list.
    ///
    /// Returns false when the contact was already on the list.
    async fn add(&self, owner_id: i64, contact_id: i64) -> Result<bool, AppError>;

    /// Contacts of `owner_id`, ordered by username.
    async fn list(&self, owner_id: i64) -> Result<Vec<Contact>, AppError>;
}
