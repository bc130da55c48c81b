//! Translation request/response and the JSON bodies carried by the broker.
//!
//! Request body: `{"text": ..., "target_language": ..., "target_dialect"?: ...}`
//! Reply body:   `{"response": ..., "source_language"?: ..., "source_dialect"?: ...}`
//!               or `{"error": ...}`

use serde::{Deserialize, Serialize};

/// One outstanding translation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationRequest {
    /// Unique per call; echoed back on the reply
    pub correlation_id: String,

    /// Queue the worker publishes the reply to
    pub reply_address: String,

    pub source_text: String,
    pub target_language: String,
    pub target_dialect: Option<String>,
}

impl TranslationRequest {
    pub fn body(&self) -> RequestBody {
        RequestBody {
            text: self.source_text.clone(),
            target_language: self.target_language.clone(),
            target_dialect: self.target_dialect.clone(),
        }
    }
}

/// Wire body of a translation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestBody {
    pub text: String,
    pub target_language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_dialect: Option<String>,
}

/// Wire body of a translation reply.
///
/// A body carrying `error` is an error reply even if it also has `response`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReplyBody {
    Failed {
        error: String,
    },
    Translated {
        response: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_language: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_dialect: Option<String>,
    },
}

impl ReplyBody {
    pub fn translated(response: impl Into<String>) -> Self {
        Self::Translated {
            response: response.into(),
            source_language: None,
            source_dialect: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
        }
    }
}

/// A completed translation, joined back to the request it answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslationResponse {
    pub correlation_id: String,
    pub translated_text: String,
    pub original_text: String,
    pub source_lang: Option<String>,
    pub source_dialect: Option<String>,
    pub target_lang: String,
    pub target_dialect: Option<String>,
}

impl TranslationResponse {
    /// Join a successful reply with its request.
    ///
    /// Returns `None` for error replies.
    pub fn from_reply(request: &TranslationRequest, reply: ReplyBody) -> Option<Self> {
        match reply {
            ReplyBody::Failed { .. } => None,
            ReplyBody::Translated {
                response,
                source_language,
                source_dialect,
            } => Some(Self {
                correlation_id: request.correlation_id.clone(),
                translated_text: response,
                original_text: request.source_text.clone(),
                source_lang: source_language,
                source_dialect,
                target_lang: request.target_language.clone(),
                target_dialect: request.target_dialect.clone(),
            }),
        }
    }
}
