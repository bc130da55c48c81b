//! User entity and repository trait.
//!
//! Maps to the `users` table. Credentials live in the same table but are
//! owned by the authentication service, so they are not part of this entity.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;

/// A chat participant.
///
/// Maps to the `users` table:
/// - id: BIGINT PRIMARY KEY
/// - username: VARCHAR(64) NOT NULL UNIQUE
/// - email: VARCHAR(120) NOT NULL UNIQUE
/// - language: VARCHAR(10) NOT NULL DEFAULT 'en'
/// - dialect: VARCHAR(10) NOT NULL DEFAULT 'US'
/// - created_at: TIMESTAMPTZ NOT NULL DEFAULT NOW()
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,

    /// Language messages to this user are translated into (e.g. "es")
    pub language: String,

    /// Regional variant of `language` (e.g. "MX")
    pub dialect: String,

    pub created_at: DateTime<Utc>,
}

impl User {
    /// Real-time room this user's sessions join on connect.
    pub fn room(&self) -> String {
        Self::room_for(self.id)
    }

    /// Room name for a user id.
    pub fn room_for(user_id: i64) -> String {
        user_id.to_string()
    }

    /// Dialect to request, if one is set.
    pub fn dialect(&self) -> Option<&str> {
        let dialect = self.dialect.trim();
        (!dialect.is_empty()).then_some(dialect)
    }
}

impl Default for User {
    fn default() -> Self {
        Self {
            id: 0,
            username: String::new(),
            email: String::new(),
            language: "en".into(),
            dialect: "US".into(),
            created_at: Utc::now(),
        }
    }
}

/// Repository trait for User data access operations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Find a user by id.
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError>;

    /// Find a user whose username or email equals `identifier`.
    async fn find_by_username_or_email(&self, identifier: &str) -> Result<Option<User>, AppError>;

    /// Insert or update a user.
    async fn save(&self, user: &User) -> Result<User, AppError>;
}
