//! Value objects exchanged across the translation RPC boundary.

mod translation;

pub use translation::{ReplyBody, RequestBody, TranslationRequest, TranslationResponse};
