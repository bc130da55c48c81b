//! Message Repository Implementation
//!
//! PostgreSQL implementation of the MessageRepository trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;

use crate::domain::{ChatMessage, MessageRepository};
use crate::shared::error::AppError;

#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: i64,
    sender_id: i64,
    receiver_id: i64,
    encrypted_content: Vec<u8>,
    translated_content: Option<String>,
    translated: bool,
    original_language: String,
    original_dialect: String,
    created_at: DateTime<Utc>,
}

impl MessageRow {
    fn into_message(self) -> ChatMessage {
        ChatMessage::from_stored(
            self.id,
            self.sender_id,
            self.receiver_id,
            self.encrypted_content,
            self.translated,
            self.translated_content,
            self.created_at,
            self.original_language,
            self.original_dialect,
        )
    }
}

/// PostgreSQL message repository implementation.
#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    #[instrument(skip(self, message), fields(message_id = message.id))]
    async fn create(&self, message: &ChatMessage) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO messages (id, sender_id, receiver_id, encrypted_content,
                                  translated_content, translated,
                                  original_language, original_dialect, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(message.id)
        .bind(message.sender_id)
        .bind(message.receiver_id)
        .bind(&message.encrypted_content)
        .bind(message.translated_content())
        .bind(message.is_translated())
        .bind(&message.original_language)
        .bind(&message.original_dialect)
        .bind(message.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Both columns change in one statement, so no reader sees one without the other.
    /// A message that is already translated is left alone.
    #[instrument(skip(self, translated_content))]
    async fn mark_translated(&self, id: i64, translated_content: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET translated_content = $2,
                translated = TRUE
            WHERE id = $1 AND translated = FALSE
            "#,
        )
        .bind(id)
        .bind(translated_content)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i64) -> Result<Option<ChatMessage>, AppError> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, sender_id, receiver_id, encrypted_content, translated_content,
                   translated, original_language, original_dialect, created_at
            FROM messages
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_message()))
    }

    #[instrument(skip(self))]
    async fn find_conversation(
        &self,
        user_a: i64,
        user_b: i64,
        limit: i64,
    ) -> Result<Vec<ChatMessage>, AppError> {
        let mut rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, sender_id, receiver_id, encrypted_content, translated_content,
                   translated, original_language, original_dialect, created_at
            FROM messages
            WHERE LEAST(sender_id, receiver_id) = LEAST($1::BIGINT, $2::BIGINT)
              AND GREATEST(sender_id, receiver_id) = GREATEST($1::BIGINT, $2::BIGINT)
            ORDER BY created_at DESC, id DESC
            LIMIT $3
            "#,
        )
        .bind(user_a)
        .bind(user_b)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.reverse();
        Ok(rows.into_iter().map(|r| r.into_message()).collect())
    }
}
