//! Response DTOs
//!
//! Data structures for API response bodies and real-time payloads.

use serde::{Deserialize, Serialize};

use crate::domain::{ChatMessage, Contact, User};

/// A message as one participant sees it.
///
/// Used for HTTP responses and as the `MESSAGE_*` dispatch payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub id: String,
    /// Sender's username
    pub sender: String,
    pub sender_id: String,
    pub receiver_id: String,
    /// Translated text for the receiver when available, otherwise the original
    pub content: String,
    pub timestamp: String,
    pub translated: bool,
    pub original_language: String,
    pub original_dialect: String,
    /// Set when the message was delivered untranslated because translation failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

impl MessagePayload {
    /// View of `message` for `viewer_id`. `message` must carry its
    /// decrypted content unless the viewer only needs the translation.
    pub fn for_viewer(
        message: &ChatMessage,
        viewer_id: i64,
        sender_name: &str,
        fallback: &str,
    ) -> Self {
        Self {
            id: message.id.to_string(),
            sender: sender_name.to_string(),
            sender_id: message.sender_id.to_string(),
            receiver_id: message.receiver_id.to_string(),
            content: message.text_for(viewer_id).unwrap_or(fallback).to_string(),
            timestamp: message.timestamp.to_rfc3339(),
            translated: message.is_translated(),
            original_language: message.original_language.clone(),
            original_dialect: message.original_dialect.clone(),
            notice: None,
        }
    }

    pub fn with_notice(mut self, notice: Option<String>) -> Self {
        self.notice = notice;
        self
    }
}

/// User response
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub language: String,
    pub dialect: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id.to_string(),
            username: user.username,
            language: user.language,
            dialect: user.dialect,
        }
    }
}

/// Contact list entry
#[derive(Debug, Clone, Serialize)]
pub struct ContactResponse {
    #[serde(flatten)]
    pub user: UserResponse,
    pub added_at: String,
}

impl From<Contact> for ContactResponse {
    fn from(contact: Contact) -> Self {
        Self {
            user: UserResponse::from(contact.user),
            added_at: contact.added_at.to_rfc3339(),
        }
    }
}
