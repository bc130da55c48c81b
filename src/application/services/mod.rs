//! Application Services
//!
//! - **MessageRelay**: encrypt, persist, translate and deliver chat messages
//! - **ContactService**: add to and list a user's contacts

pub mod contacts;
pub mod message_relay;

pub use contacts::{ContactError, ContactService};
pub use message_relay::{
    MessageRelay, RelayError, RelayEvent, RoomEmitter, SentMessage, DEFAULT_HISTORY_LIMIT,
    MAX_HISTORY_LIMIT, UNREADABLE_CONTENT,
};

#[cfg(test)]
pub use message_relay::MockRoomEmitter;
