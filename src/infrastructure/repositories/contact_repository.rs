//! Contact Repository Implementation
//!
//! PostgreSQL implementation of the ContactRepository trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;

use crate::domain::{Contact, ContactRepository, User};
use crate::shared::error::AppError;

/// A contacts row joined with the contact's user row.
#[derive(Debug, sqlx::FromRow)]
struct ContactRow {
    owner_id: i64,
    id: i64,
    username: String,
    email: String,
    language: String,
    dialect: String,
    created_at: DateTime<Utc>,
    added_at: DateTime<Utc>,
}

impl ContactRow {
    fn into_contact(self) -> Contact {
        Contact {
            owner_id: self.owner_id,
            user: User {
                id: self.id,
                username: self.username,
                email: self.email,
                language: self.language,
                dialect: self.dialect,
                created_at: self.created_at,
            },
            added_at: self.added_at,
        }
    }
}

/// PostgreSQL contact repository implementation.
#[derive(Clone)]
pub struct PgContactRepository {
    pool: PgPool,
}

impl PgContactRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContactRepository for PgContactRepository {
    #[instrument(skip(self))]
    async fn add(&self, owner_id: i64, contact_id: i64) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO contacts (owner_id, contact_id)
            VALUES ($1, $2)
            ON CONFLICT (owner_id, contact_id) DO NOTHING
            "#,
        )
        .bind(owner_id)
        .bind(contact_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn list(&self, owner_id: i64) -> Result<Vec<Contact>, AppError> {
        let rows = sqlx::query_as::<_, ContactRow>(
            r#"
            SELECT c.owner_id, u.id, u.username, u.email, u.language, u.dialect,
                   u.created_at, c.created_at AS added_at
            FROM contacts c
            JOIN users u ON u.id = c.contact_id
            WHERE c.owner_id = $1
            ORDER BY u.username
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ContactRow::into_contact).collect())
    }
}
