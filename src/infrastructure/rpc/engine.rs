//! Translation engines used by the worker.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::WorkerSettings;

/// Engine errors.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("engine returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("engine returned an empty translation")]
    Empty,
}

/// Something that turns text into text in another language.
#[async_trait]
pub trait TranslationEngine: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        target_language: &str,
        target_dialect: Option<&str>,
    ) -> Result<String, EngineError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

/// Engine backed by an Ollama-compatible `/api/chat` endpoint.
#[derive(Clone)]
pub struct OllamaEngine {
    http_client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OllamaEngine {
    pub fn new(settings: &WorkerSettings) -> Result<Self, EngineError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.engine_timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            endpoint: format!("{}/api/chat", settings.engine_url.trim_end_matches('/')),
            model: settings.model.clone(),
        })
    }
}

/// Instruction sent with every request.
pub fn translation_prompt(text: &str, target_language: &str, target_dialect: Option<&str>) -> String {
    let target = match target_dialect {
        Some(dialect) => format!("{} ({})", target_language, dialect),
        None => target_language.to_string(),
    };
    format!(
        "Translate the following message to {}. Reply with the translation only.\n\n{}",
        target, text
    )
}

#[async_trait]
impl TranslationEngine for OllamaEngine {
    async fn translate(
        &self,
        text: &str,
        target_language: &str,
        target_dialect: Option<&str>,
    ) -> Result<String, EngineError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user".into(),
                content: translation_prompt(text, target_language, target_dialect),
            }],
            stream: false,
        };

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let reply: ChatResponse = response.json().await?;
        let translated = reply.message.content.trim();
        if translated.is_empty() {
            return Err(EngineError::Empty);
        }
        Ok(translated.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_names_dialect() {
        let prompt = translation_prompt("hello", "es", Some("MX"));
        assert!(prompt.contains("es (MX)"));
        assert!(prompt.ends_with("hello"));
    }

    #[test]
    fn test_prompt_without_dialect() {
        let prompt = translation_prompt("hello", "fr", None);
        assert!(prompt.contains("to fr."));
    }

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let settings = WorkerSettings {
            consumer_tag: "w".into(),
            engine_url: "http://localhost:11434/".into(),
            model: "dolphin-llama3".into(),
            engine_timeout_secs: 5,
            embedded: false,
        };
        let engine = OllamaEngine::new(&settings).unwrap();
        assert_eq!(engine.endpoint, "http://localhost:11434/api/chat");
    }
}
