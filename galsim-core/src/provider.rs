//! The language-model seam.
//!
//! The dialogue engine only needs "send this prompt, give me text back".
//! [`LlmProvider`] is that capability; [`llm::Client`] implements it for real
//! endpoints and [`crate::testing::MockProvider`] for tests.

use async_trait::async_trait;
use llm::{Client, Message, Request};
use thiserror::Error;

/// Generation settings for JSON dialogue replies.
const JSON_MAX_TOKENS: usize = 500;
const JSON_TEMPERATURE: f32 = 0.7;

/// Generation settings for short free-text replies (theme names).
const TEXT_MAX_TOKENS: usize = 100;
const TEXT_TEMPERATURE: f32 = 0.8;

/// Failures of the language-model capability. Never retried by the engine.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider unreachable: {0}")]
    Unavailable(String),

    #[error("provider rejected the request (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("provider returned no content")]
    EmptyContent,

    #[error("provider misconfigured: {0}")]
    Config(String),
}

impl From<llm::Error> for ProviderError {
    fn from(err: llm::Error) -> Self {
        match err {
            llm::Error::Network(message) => ProviderError::Unavailable(message),
            llm::Error::Api { status, message } => ProviderError::Rejected { status, message },
            llm::Error::Parse(message) => {
                ProviderError::Unavailable(format!("unreadable response envelope: {message}"))
            }
            llm::Error::EmptyContent => ProviderError::EmptyContent,
            llm::Error::NoApiKey => ProviderError::Config("API key not configured".to_string()),
            llm::Error::Config(message) => ProviderError::Config(message),
        }
    }
}

/// A text-completion capability.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Complete `prompt`. With `want_json`, the model is asked for a JSON
    /// object, though callers must not rely on getting one.
    async fn complete(&self, prompt: &str, want_json: bool) -> Result<String, ProviderError>;
}

#[async_trait]
impl LlmProvider for Client {
    async fn complete(&self, prompt: &str, want_json: bool) -> Result<String, ProviderError> {
        let request = Request::new(vec![Message::user(prompt)]);
        let request = if want_json {
            request
                .with_max_tokens(JSON_MAX_TOKENS)
                .with_temperature(JSON_TEMPERATURE)
                .with_json_response()
        } else {
            request
                .with_max_tokens(TEXT_MAX_TOKENS)
                .with_temperature(TEXT_TEMPERATURE)
        };

        Ok(self.complete_text(request).await?)
    }
}
