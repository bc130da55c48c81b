//! Word-list language detection.
//!
//! Scores text against a short list of very common words per language and
//! picks the best match. Good enough to label short chat messages; not a
//! general-purpose classifier.

/// Language code used when no word matches.
pub const UNDETERMINED_LANGUAGE: &str = "und";

/// Dialect used when no word matches.
pub const UNDETERMINED_DIALECT: &str = "Unknown";

/// Detected source language and dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedLanguage {
    pub language: String,
    pub dialect: String,
}

impl DetectedLanguage {
    pub fn undetermined() -> Self {
        Self {
            language: UNDETERMINED_LANGUAGE.into(),
            dialect: UNDETERMINED_DIALECT.into(),
        }
    }

    pub fn is_determined(&self) -> bool {
        self.language != UNDETERMINED_LANGUAGE
    }
}

struct Profile {
    language: &'static str,
    dialect: &'static str,
    words: &'static [&'static str],
}

/// Ties go to the earlier profile.
const PROFILES: &[Profile] = &[
    Profile {
        language: "en",
        dialect: "US",
        words: &["the", "be", "to", "of", "and", "in", "that", "have", "it", "for"],
    },
    Profile {
        language: "es",
        dialect: "ES",
        words: &["el", "la", "de", "que", "y", "en", "un", "ser", "se", "no"],
    },
    Profile {
        language: "fr",
        dialect: "FR",
        words: &["le", "la", "de", "et", "est", "pas", "un", "vous", "que", "qui"],
    },
];

/// Stateless word-list language detector.
#[derive(Debug, Clone, Copy, Default)]
pub struct LanguageDetector;

impl LanguageDetector {
    pub fn new() -> Self {
        Self
    }

    /// Detect the language of `text`.
    pub fn detect(&self, text: &str) -> DetectedLanguage {
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|w| !w.is_empty())
            .collect();

        let mut best: Option<(&Profile, usize)> = None;
        for profile in PROFILES {
            let score = words.iter().filter(|w| profile.words.contains(w)).count();
            if score > 0 && best.map_or(true, |(_, top)| score > top) {
                best = Some((profile, score));
            }
        }

        match best {
            Some((profile, _)) => DetectedLanguage {
                language: profile.language.into(),
                dialect: profile.dialect.into(),
            },
            None => DetectedLanguage::undetermined(),
        }
    }
}
