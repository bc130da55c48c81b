//! Data Transfer Objects
//!
//! DTOs for API request/response serialization.

pub mod request;
pub mod response;

pub use request::{AddContactRequest, ConversationQuery, SendMessageRequest, UserLookupQuery};
pub use response::{ContactResponse, MessagePayload, UserResponse};
