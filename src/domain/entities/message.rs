//! Chat message entity and repository trait.
//!
//! Maps to the `messages` table in the database schema.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::shared::error::AppError;

/// A direct message between two users.
///
/// Maps to the `messages` table:
/// - id: BIGINT PRIMARY KEY (Snowflake ID)
/// - sender_id / receiver_id: BIGINT NOT NULL REFERENCES users(id)
/// - encrypted_content: BYTEA NOT NULL
/// - translated_content: TEXT NULL
/// - translated: BOOLEAN NOT NULL DEFAULT FALSE
/// - original_language / original_dialect: VARCHAR(10) NOT NULL
/// - created_at: TIMESTAMPTZ NOT NULL
///
/// The translated text and the `translated` flag are a single field here,
/// so a message can never claim to be translated without its text.
#[derive(Clone)]
pub struct ChatMessage {
    /// Snowflake ID (primary key)
    pub id: i64,

    pub sender_id: i64,

    pub receiver_id: i64,

    /// `nonce || ciphertext || tag`, never exposed outside the process
    pub encrypted_content: Vec<u8>,

    /// Decrypted content; transient, never persisted
    content: Option<String>,

    translation: Option<String>,

    pub timestamp: DateTime<Utc>,

    pub original_language: String,

    pub original_dialect: String,
}

impl ChatMessage {
    /// Build a freshly encrypted, not yet translated message.
    pub fn new(
        id: i64,
        sender_id: i64,
        receiver_id: i64,
        encrypted_content: Vec<u8>,
        original_language: impl Into<String>,
        original_dialect: impl Into<String>,
    ) -> Self {
        Self {
            id,
            sender_id,
            receiver_id,
            encrypted_content,
            content: None,
            translation: None,
            timestamp: Utc::now(),
            original_language: original_language.into(),
            original_dialect: original_dialect.into(),
        }
    }

    /// Rebuild a message from its stored columns.
    ///
    /// A row flagged translated without text is read back as untranslated.
    #[allow(clippy::too_many_arguments)]
    pub fn from_stored(
        id: i64,
        sender_id: i64,
        receiver_id: i64,
        encrypted_content: Vec<u8>,
        translated: bool,
        translated_content: Option<String>,
        timestamp: DateTime<Utc>,
        original_language: String,
        original_dialect: String,
    ) -> Self {
        Self {
            id,
            sender_id,
            receiver_id,
            encrypted_content,
            content: None,
            translation: translated.then_some(translated_content).flatten(),
            timestamp,
            original_language,
            original_dialect,
        }
    }

    /// Whether a translation has been attached.
    pub fn is_translated(&self) -> bool {
        self.translation.is_some()
    }

    /// The translated text, present only when translated.
    pub fn translated_content(&self) -> Option<&str> {
        self.translation.as_deref()
    }

    /// Attach a successful translation.
    pub fn apply_translation(&mut self, text: impl Into<String>) {
        self.translation = Some(text.into());
    }

    /// The decrypted content, if this instance carries it.
    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    /// Attach decrypted content for building views.
    pub fn with_content(mut self, plaintext: impl Into<String>) -> Self {
        self.content = Some(plaintext.into());
        self
    }

    /// Text the receiver should see: the translation, else the original.
    pub fn receiver_text(&self) -> Option<&str> {
        self.translated_content().or(self.content())
    }

    /// Text shown to `viewer_id`: receivers get the translation when there
    /// is one, everybody else the original.
    pub fn text_for(&self, viewer_id: i64) -> Option<&str> {
        if viewer_id == self.receiver_id {
            self.receiver_text()
        } else {
            self.content()
        }
    }

    /// Whether `user_id` is a participant.
    pub fn involves(&self, user_id: i64) -> bool {
        self.sender_id == user_id || self.receiver_id == user_id
    }
}

impl fmt::Debug for ChatMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatMessage")
            .field("id", &self.id)
            .field("sender_id", &self.sender_id)
            .field("receiver_id", &self.receiver_id)
            .field("encrypted_len", &self.encrypted_content.len())
            .field("translated", &self.is_translated())
            .field("timestamp", &self.timestamp)
            .field("original_language", &self.original_language)
            .field("original_dialect", &self.original_dialect)
            .finish_non_exhaustive()
    }
}

/// Repository trait for ChatMessage data access operations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Persist a new message (untranslated).
    async fn create(&self, message: &ChatMessage) -> Result<(), AppError>;

    /// Store the translated text and set `translated` in one write.
    ///
    /// Returns `false` when no such message exists or it is already
    /// translated; the stored translation is never overwritten.
    async fn mark_translated(&self, id: i64, translated_content: &str) -> Result<bool, AppError>;

    /// Find a message by id.
    async fn find_by_id(&self, id: i64) -> Result<Option<ChatMessage>, AppError>;

    /// Messages exchanged between two users, oldest first, at most `limit`
    /// of the most recent ones.
    async fn find_conversation(
        &self,
        user_a: i64,
        user_b: i64,
        limit: i64,
    ) -> Result<Vec<ChatMessage>, AppError>;
}
