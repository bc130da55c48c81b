//! Message Relay
//!
//! Moves one chat message through
//! `Received -> Encrypted & persisted -> Translation requested -> Delivered`.
//! Translation is best effort: when it is unavailable the message is still
//! stored and delivered with its original content.

use std::sync::Arc;

use dashmap::DashSet;
use tracing::instrument;

use crate::application::dto::request::MAX_MESSAGE_CHARS;
use crate::application::dto::MessagePayload;
use crate::domain::{
    ChatMessage, LanguageDetector, MessageRepository, Translation, Translator, User,
    UserRepository,
};
use crate::infrastructure::crypto::{ContentCipher, CryptoError};
use crate::infrastructure::metrics;
use crate::shared::error::AppError;
use crate::shared::snowflake::SnowflakeGenerator;

/// History page size when none is given
pub const DEFAULT_HISTORY_LIMIT: i64 = 50;

/// Largest history page
pub const MAX_HISTORY_LIMIT: i64 = 100;

/// Shown in place of content that can no longer be decrypted
pub const UNREADABLE_CONTENT: &str = "[message could not be decrypted]";

/// Real-time events produced by the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    MessageCreate(MessagePayload),
    MessageUpdate(MessagePayload),
}

impl RelayEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RelayEvent::MessageCreate(_) => "MESSAGE_CREATE",
            RelayEvent::MessageUpdate(_) => "MESSAGE_UPDATE",
        }
    }

    pub fn payload(&self) -> &MessagePayload {
        match self {
            RelayEvent::MessageCreate(p) | RelayEvent::MessageUpdate(p) => p,
        }
    }
}

/// Delivers events to the live sessions joined to a room.
#[cfg_attr(test, mockall::automock)]
pub trait RoomEmitter: Send + Sync {
    /// Returns the number of sessions the event was handed to.
    fn emit_to_room(&self, room: &str, event: RelayEvent) -> usize;
}

/// Relay errors
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Message content is empty")]
    EmptyContent,

    #[error("Message content exceeds 2000 characters")]
    ContentTooLong,

    #[error("Sender not found")]
    SenderNotFound,

    #[error("Receiver not found")]
    ReceiverNotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("Message not found")]
    MessageNotFound,

    #[error("Only participants may do this")]
    Forbidden,

    #[error("Message is already translated")]
    AlreadyTranslated,

    #[error("Translation already in progress for this message")]
    TranslationInProgress,

    #[error("Encryption failed: {0}")]
    Encryption(#[source] CryptoError),

    #[error("Decryption failed: {0}")]
    Decryption(#[source] CryptoError),

    #[error(transparent)]
    Storage(#[from] AppError),
}

impl From<RelayError> for AppError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::EmptyContent | RelayError::ContentTooLong => {
                AppError::validation(err.to_string())
            }
            RelayError::SenderNotFound
            | RelayError::ReceiverNotFound
            | RelayError::UserNotFound
            | RelayError::MessageNotFound => AppError::NotFound(err.to_string()),
            RelayError::Forbidden => AppError::Forbidden(err.to_string()),
            RelayError::AlreadyTranslated | RelayError::TranslationInProgress => {
                AppError::Conflict(err.to_string())
            }
            RelayError::Encryption(_) | RelayError::Decryption(_) => {
                AppError::Internal(err.to_string())
            }
            RelayError::Storage(e) => e,
        }
    }
}

/// A message that went through the relay, as its sender sees it.
#[derive(Debug, Clone)]
pub struct SentMessage {
    /// Carries its decrypted content
    pub message: ChatMessage,
    pub sender_name: String,
    /// User-facing notice when delivered untranslated
    pub notice: Option<String>,
    /// Receiver sessions the message was delivered to
    pub delivered: usize,
}

impl SentMessage {
    pub fn view(&self) -> MessagePayload {
        MessagePayload::for_viewer(&self.message, self.message.sender_id, &self.sender_name, "")
            .with_notice(self.notice.clone())
    }
}

/// Marks a message as having a translation RPC in flight.
struct InFlight<'a> {
    set: &'a DashSet<i64>,
    id: i64,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.id);
    }
}

/// The message relay service.
pub struct MessageRelay {
    users: Arc<dyn UserRepository>,
    messages: Arc<dyn MessageRepository>,
    translator: Arc<dyn Translator>,
    rooms: Arc<dyn RoomEmitter>,
    cipher: Arc<ContentCipher>,
    ids: Arc<SnowflakeGenerator>,
    detector: LanguageDetector,
    in_flight: DashSet<i64>,
}

impl MessageRelay {
    pub fn new(
        users: Arc<dyn UserRepository>,
        messages: Arc<dyn MessageRepository>,
        translator: Arc<dyn Translator>,
        rooms: Arc<dyn RoomEmitter>,
        cipher: Arc<ContentCipher>,
        ids: Arc<SnowflakeGenerator>,
    ) -> Self {
        Self {
            users,
            messages,
            translator,
            rooms,
            cipher,
            ids,
            detector: LanguageDetector::new(),
            in_flight: DashSet::new(),
        }
    }

    /// Send `plaintext` from `sender_id` to `receiver_id`.
    ///
    /// The message is encrypted before anything leaves the process, persisted
    /// untranslated, translated for the receiver if possible, and delivered
    /// to the receiver's room either way.
    #[instrument(skip(self, plaintext), fields(message_id))]
    pub async fn send(
        &self,
        sender_id: i64,
        receiver_id: i64,
        plaintext: &str,
    ) -> Result<SentMessage, RelayError> {
        if plaintext.trim().is_empty() {
            return Err(RelayError::EmptyContent);
        }
        if plaintext.chars().count() > MAX_MESSAGE_CHARS {
            return Err(RelayError::ContentTooLong);
        }

        let sender = self
            .users
            .find_by_id(sender_id)
            .await?
            .ok_or(RelayError::SenderNotFound)?;
        let receiver = self
            .users
            .find_by_id(receiver_id)
            .await?
            .ok_or(RelayError::ReceiverNotFound)?;

        let encrypted = self.cipher.encrypt(plaintext).map_err(|e| {
            tracing::error!(error = %e, "Message encryption failed");
            RelayError::Encryption(e)
        })?;

        let detected = self.detector.detect(plaintext);
        let id = self.ids.generate();
        tracing::Span::current().record("message_id", id);
        let _in_flight = self.begin_translation(id)?;

        let mut message = ChatMessage::new(
            id,
            sender.id,
            receiver.id,
            encrypted,
            detected.language,
            detected.dialect,
        )
        .with_content(plaintext);

        self.messages.create(&message).await?;

        let notice = self.translate_for(&mut message, plaintext, &receiver).await;
        metrics::record_relay_message(message.is_translated());

        let payload = MessagePayload::for_viewer(&message, receiver.id, &sender.username, plaintext)
            .with_notice(notice.clone());
        let delivered = self
            .rooms
            .emit_to_room(&receiver.room(), RelayEvent::MessageCreate(payload));

        tracing::info!(
            sender_id = sender.id,
            receiver_id = receiver.id,
            translated = message.is_translated(),
            delivered,
            "Message relayed"
        );

        Ok(SentMessage {
            message,
            sender_name: sender.username,
            notice,
            delivered,
        })
    }

    /// Messages between `viewer_id` and `contact_id`, oldest first, as the
    /// viewer sees them.
    #[instrument(skip(self))]
    pub async fn conversation(
        &self,
        viewer_id: i64,
        contact_id: i64,
        limit: Option<i64>,
    ) -> Result<Vec<MessagePayload>, RelayError> {
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);

        let viewer = self
            .users
            .find_by_id(viewer_id)
            .await?
            .ok_or(RelayError::UserNotFound)?;
        let contact = self
            .users
            .find_by_id(contact_id)
            .await?
            .ok_or(RelayError::UserNotFound)?;

        let history = self
            .messages
            .find_conversation(viewer.id, contact.id, limit)
            .await?;

        Ok(history
            .into_iter()
            .map(|message| {
                let sender_name = if message.sender_id == viewer.id {
                    &viewer.username
                } else {
                    &contact.username
                };
                let message = self.decrypted(message);
                MessagePayload::for_viewer(&message, viewer.id, sender_name, UNREADABLE_CONTENT)
            })
            .collect())
    }

    /// Re-run translation for a message that was delivered untranslated.
    ///
    /// Only the sender or the receiver may ask. The updated message is
    /// delivered to the receiver's room as `MESSAGE_UPDATE`; the returned
    /// view is the actor's.
    #[instrument(skip(self))]
    pub async fn retry_translation(
        &self,
        message_id: i64,
        actor_id: i64,
    ) -> Result<MessagePayload, RelayError> {
        // Claim the id before reading so the translated check below sees
        // whatever an earlier RPC on this message stored.
        let _in_flight = self.begin_translation(message_id)?;

        let message = self
            .messages
            .find_by_id(message_id)
            .await?
            .ok_or(RelayError::MessageNotFound)?;

        if !message.involves(actor_id) {
            return Err(RelayError::Forbidden);
        }
        if message.is_translated() {
            return Err(RelayError::AlreadyTranslated);
        }

        let sender = self
            .users
            .find_by_id(message.sender_id)
            .await?
            .ok_or(RelayError::SenderNotFound)?;
        let receiver = self
            .users
            .find_by_id(message.receiver_id)
            .await?
            .ok_or(RelayError::ReceiverNotFound)?;

        let plaintext = self
            .cipher
            .decrypt(&message.encrypted_content)
            .map_err(RelayError::Decryption)?;
        let mut message = message.with_content(plaintext.clone());

        let notice = self.translate_for(&mut message, &plaintext, &receiver).await;
        metrics::record_relay_message(message.is_translated());

        let update = MessagePayload::for_viewer(&message, receiver.id, &sender.username, &plaintext)
            .with_notice(notice.clone());
        self.rooms
            .emit_to_room(&receiver.room(), RelayEvent::MessageUpdate(update));

        Ok(
            MessagePayload::for_viewer(&message, actor_id, &sender.username, &plaintext)
                .with_notice(notice),
        )
    }

    /// Number of messages with a translation RPC in flight.
    pub fn translations_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn begin_translation(&self, id: i64) -> Result<InFlight<'_>, RelayError> {
        if !self.in_flight.insert(id) {
            return Err(RelayError::TranslationInProgress);
        }
        Ok(InFlight {
            set: &self.in_flight,
            id,
        })
    }

    /// Translate for `receiver` and store the result. Returns the degraded
    /// notice when the message stays untranslated.
    async fn translate_for(
        &self,
        message: &mut ChatMessage,
        plaintext: &str,
        receiver: &User,
    ) -> Option<String> {
        let outcome = self
            .translator
            .translate(plaintext, &receiver.language, receiver.dialect())
            .await;

        let response = match outcome {
            Translation::Translated(response) => response,
            Translation::Unavailable(unavailable) => {
                tracing::warn!(
                    message_id = message.id,
                    reason = %unavailable.reason,
                    "Delivering message untranslated"
                );
                return Some(unavailable.notice);
            }
        };

        match self
            .messages
            .mark_translated(message.id, &response.translated_text)
            .await
        {
            Ok(true) => {
                message.apply_translation(response.translated_text);
                None
            }
            Ok(false) => {
                tracing::warn!(message_id = message.id, "Message missing or already translated; translation discarded");
                None
            }
            Err(e) => {
                tracing::error!(message_id = message.id, error = %e, "Failed to store translation");
                Some(crate::domain::DEGRADED_NOTICE.to_string())
            }
        }
    }

    fn decrypted(&self, message: ChatMessage) -> ChatMessage {
        match self.cipher.decrypt(&message.encrypted_content) {
            Ok(plaintext) => message.with_content(plaintext),
            Err(e) => {
                tracing::warn!(message_id = message.id, error = %e, "Stored message is unreadable");
                message
            }
        }
    }
}
