//! Domain services.

mod language_detection;
mod translation;

pub use language_detection::{DetectedLanguage, LanguageDetector, UNDETERMINED_DIALECT, UNDETERMINED_LANGUAGE};
pub use translation::{Translation, Translator, Unavailable, UnavailableReason, DEGRADED_NOTICE};
