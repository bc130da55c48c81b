//! The translation seam between the relay and the RPC client.

use std::fmt;

use async_trait::async_trait;

use crate::domain::value_objects::TranslationResponse;

/// Notice shown to users when a message is delivered untranslated.
pub const DEGRADED_NOTICE: &str =
    "Translation is temporarily unavailable; the original message was delivered.";

/// Why a translation could not be produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    /// No usable broker connection
    ConnectionFailed,
    /// The request could not be handed to the broker
    PublishFailed,
    /// No reply within the deadline
    TimedOut,
    /// The worker answered with an error
    WorkerError,
}

impl UnavailableReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectionFailed => "connection_failed",
            Self::PublishFailed => "publish_failed",
            Self::TimedOut => "timed_out",
            Self::WorkerError => "worker_error",
        }
    }
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Degraded result of a translation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unavailable {
    pub reason: UnavailableReason,
    /// User-facing notice
    pub notice: String,
    /// Operator-facing detail, logged but never shown to users
    pub detail: String,
}

impl Unavailable {
    pub fn new(reason: UnavailableReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            notice: DEGRADED_NOTICE.to_string(),
            detail: detail.into(),
        }
    }
}

/// Outcome of a translation call. Failures are values, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translation {
    Translated(TranslationResponse),
    Unavailable(Unavailable),
}

impl Translation {
    pub fn unavailable(reason: UnavailableReason, detail: impl Into<String>) -> Self {
        Self::Unavailable(Unavailable::new(reason, detail))
    }

    pub fn is_translated(&self) -> bool {
        matches!(self, Self::Translated(_))
    }

    /// The translated text on success.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Translated(response) => Some(&response.translated_text),
            Self::Unavailable(_) => None,
        }
    }
}

/// Something that can translate text, bounded in time.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text`. Never blocks past the configured timeout and never
    /// returns an error: failures come back as `Translation::Unavailable`.
    async fn translate(
        &self,
        text: &str,
        target_language: &str,
        target_dialect: Option<&str>,
    ) -> Translation;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_carries_notice() {
        let outcome = Translation::unavailable(UnavailableReason::TimedOut, "no reply in 30s");
        assert!(!outcome.is_translated());
        assert_eq!(outcome.text(), None);
        match outcome {
            Translation::Unavailable(u) => {
                assert_eq!(u.notice, DEGRADED_NOTICE);
                assert_eq!(u.reason.as_str(), "timed_out");
            }
            Translation::Translated(_) => panic!("expected unavailable"),
        }
    }
}
