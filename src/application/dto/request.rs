//! Request DTOs
//!
//! Data structures for API request bodies and query strings.

use serde::Deserialize;
use validator::Validate;

/// Longest message accepted, in characters
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Send message request
#[derive(Debug, Deserialize, Validate)]
pub struct SendMessageRequest {
    pub receiver_id: i64,

    #[validate(length(min = 1, max = 2000, message = "Content must be 1-2000 characters"))]
    pub content: String,
}

/// Conversation history query (`?limit=`)
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ConversationQuery {
    #[validate(range(min = 1, max = 100, message = "Limit must be 1-100"))]
    pub limit: Option<i64>,
}

/// User lookup query (`?q=`)
#[derive(Debug, Deserialize, Validate)]
pub struct UserLookupQuery {
    #[validate(length(min = 1, max = 120, message = "Query must be 1-120 characters"))]
    pub q: String,
}

/// Add contact request
#[derive(Debug, Deserialize, Validate)]
pub struct AddContactRequest {
    #[validate(length(min = 1, max = 64, message = "Username must be 1-64 characters"))]
    pub username: String,
}
