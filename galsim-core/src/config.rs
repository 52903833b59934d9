//! Engine configuration.
//!
//! Loaded once at startup from the environment. A missing or placeholder API
//! key is fatal: there is no point serving sessions that can never reach the
//! model.

use crate::prompts::DEFAULT_HISTORY_WINDOW;
use crate::store::{DEFAULT_MAX_HISTORY, DEFAULT_SESSION_TIMEOUT_SECS};
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = llm::DEFAULT_BASE_URL;
pub const DEFAULT_MODEL: &str = llm::DEFAULT_MODEL;

/// Values that mean "nobody filled this in".
const PLACEHOLDER_KEYS: &[&str] = &[
    "your_api_key_here",
    "your-api-key",
    "your_api_key",
    "sk-xxx",
    "changeme",
];

/// Errors from loading or validating configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("LLM_API_KEY is not set - put it in .env or export it")]
    MissingApiKey,

    #[error("LLM_API_KEY still holds the placeholder value {0:?}")]
    PlaceholderApiKey(String),

    #[error("{name} must be a positive integer, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },
}

/// Configuration for the dialogue engine and its model client.
#[derive(Debug, Clone)]
pub struct GalConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Idle seconds before a session expires.
    pub session_timeout_secs: u64,
    /// Stored history entries per session.
    pub max_history: usize,
    /// History turns included in each continuation prompt.
    pub history_window: usize,
}

impl GalConfig {
    /// Create a config with the given key and defaults for everything else.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            session_timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
            max_history: DEFAULT_MAX_HISTORY,
            history_window: DEFAULT_HISTORY_WINDOW,
        }
    }

    /// Load from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut config = Self::new(get("LLM_API_KEY").ok_or(ConfigError::MissingApiKey)?);
        if let Some(base_url) = get("LLM_BASE_URL") {
            config.base_url = base_url;
        }
        if let Some(model) = get("LLM_MODEL") {
            config.model = model;
        }
        if let Some(value) = get("GALSIM_SESSION_TIMEOUT_SECS") {
            config.session_timeout_secs = parse_positive("GALSIM_SESSION_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = get("GALSIM_MAX_HISTORY") {
            config.max_history = parse_positive("GALSIM_MAX_HISTORY", &value)?;
        }
        if let Some(value) = get("GALSIM_HISTORY_WINDOW") {
            config.history_window = parse_positive("GALSIM_HISTORY_WINDOW", &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the API key is real.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let key = self.api_key.trim();
        if key.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if PLACEHOLDER_KEYS.iter().any(|p| key.eq_ignore_ascii_case(p)) {
            return Err(ConfigError::PlaceholderApiKey(key.to_string()));
        }
        Ok(())
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_session_timeout_secs(mut self, secs: u64) -> Self {
        self.session_timeout_secs = secs;
        self
    }

    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    /// Build a model client for this configuration.
    pub fn client(&self) -> llm::Client {
        llm::Client::new(&self.api_key)
            .with_base_url(&self.base_url)
            .with_model(&self.model)
    }
}

fn parse_positive<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    match value.parse::<T>() {
        Ok(n) if n > T::default() => Ok(n),
        _ => Err(ConfigError::InvalidNumber {
            name,
            value: value.to_string(),
        }),
    }
}
