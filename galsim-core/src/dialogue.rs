//! The dialogue engine.
//!
//! Sequences one conversation turn: resolve the theme or score the player's
//! choice, prompt the model, normalize its reply, and record both sides in
//! the session store. The engine holds no session state of its own; every
//! mutation goes through [`SessionStore`].
//!
//! Concurrent `continue_dialogue` calls on the *same* session are a caller
//! error. They will not corrupt the store, but the order of their history
//! entries is unspecified.

use crate::affection::compute_delta;
use crate::config::GalConfig;
use crate::normalize::{normalize, NormalizedDialogue, Strategy, CHOICE_COUNT};
use crate::prompts::{self, DEFAULT_HISTORY_WINDOW};
use crate::provider::{LlmProvider, ProviderError};
use crate::store::{Role, SessionInfo, SessionStore};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Theme hint asking the model to invent a theme.
pub const AUTO_THEME: &str = "auto";

pub const OP_GENERATE_THEME: &str = "generate_theme";
pub const OP_START_DIALOGUE: &str = "start_dialogue";
pub const OP_CONTINUE_DIALOGUE: &str = "continue_dialogue";

/// Errors from dialogue operations.
#[derive(Debug, Error)]
pub enum DialogueError {
    #[error("{operation} failed: {source}")]
    Provider {
        operation: &'static str,
        #[source]
        source: ProviderError,
    },

    #[error("session {0} not found or expired")]
    NotFound(String),
}

impl DialogueError {
    fn provider(operation: &'static str, source: ProviderError) -> Self {
        tracing::error!(operation, error = %source, "language model call failed");
        DialogueError::Provider { operation, source }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DialogueError::NotFound(_))
    }
}

/// Result of starting a conversation.
#[derive(Debug, Clone, Serialize)]
pub struct StartResponse {
    pub session_id: String,
    pub theme: String,
    pub initial_dialogue: String,
    pub choices: [String; CHOICE_COUNT],
    pub affection: u8,
}

/// Result of one continued turn.
#[derive(Debug, Clone, Serialize)]
pub struct ContinueResponse {
    pub character_response: String,
    pub choices: [String; CHOICE_COUNT],
    pub affection: u8,
}

/// Drives conversations against a language model.
pub struct DialogueEngine<P> {
    provider: P,
    store: Arc<SessionStore>,
    history_window: usize,
}

impl DialogueEngine<llm::Client> {
    /// Build an engine with a real client and a fresh store from `config`.
    pub fn from_config(config: &GalConfig) -> Self {
        let store = SessionStore::with_limits(config.session_timeout_secs, config.max_history);
        Self::new(config.client(), Arc::new(store)).with_history_window(config.history_window)
    }
}

impl<P: LlmProvider> DialogueEngine<P> {
    pub fn new(provider: P, store: Arc<SessionStore>) -> Self {
        Self {
            provider,
            store,
            history_window: DEFAULT_HISTORY_WINDOW,
        }
    }

    /// Set how many history turns each continuation prompt shows.
    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Start a conversation under a freshly generated session id.
    pub async fn start_new(
        &self,
        theme_hint: Option<&str>,
        custom_theme: Option<&str>,
    ) -> Result<StartResponse, DialogueError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.start(&id, theme_hint, custom_theme).await
    }

    /// Start (or restart) the conversation for `id`.
    ///
    /// Any existing session under `id` is replaced. Nothing is stored unless
    /// every model call succeeds.
    pub async fn start(
        &self,
        id: &str,
        theme_hint: Option<&str>,
        custom_theme: Option<&str>,
    ) -> Result<StartResponse, DialogueError> {
        let theme = self.resolve_theme(theme_hint, custom_theme).await?;

        let raw = self
            .provider
            .complete(&prompts::opening_prompt(&theme), true)
            .await
            .map_err(|e| DialogueError::provider(OP_START_DIALOGUE, e))?;
        let dialogue = self.normalize_reply(id, &raw);

        let session = self.store.create(id, theme.clone()).await;
        if !self
            .store
            .append_turn(id, Role::Character, dialogue.prose.clone())
            .await
        {
            return Err(DialogueError::NotFound(id.to_string()));
        }

        tracing::info!(session_id = %id, theme = %theme, "started dialogue");

        Ok(StartResponse {
            session_id: id.to_string(),
            theme,
            initial_dialogue: dialogue.prose,
            choices: dialogue.choices,
            affection: session.affection,
        })
    }

    /// Answer the player's choice in an existing conversation.
    ///
    /// The theme override, affection change and the player's turn are
    /// recorded before the model is called and stay recorded if it fails.
    pub async fn continue_dialogue(
        &self,
        id: &str,
        user_input: &str,
        theme_override: Option<&str>,
    ) -> Result<ContinueResponse, DialogueError> {
        let not_found = || DialogueError::NotFound(id.to_string());

        let session = self.store.get(id).await.ok_or_else(not_found)?;
        let mut theme = session.theme;

        if let Some(new_theme) = theme_override.filter(|t| !t.trim().is_empty()) {
            if new_theme != theme {
                if !self.store.set_theme(id, new_theme).await {
                    return Err(not_found());
                }
                tracing::debug!(session_id = %id, theme = %new_theme, "theme overridden");
                theme = new_theme.to_string();
            }
        }

        let delta = compute_delta(user_input);
        let affection = self
            .store
            .adjust_affection(id, delta)
            .await
            .ok_or_else(not_found)?;

        if !self.store.append_turn(id, Role::User, user_input).await {
            return Err(not_found());
        }

        let session = self.store.get(id).await.ok_or_else(not_found)?;
        let prompt = prompts::continuation_prompt(
            &theme,
            session.recent_turns(self.history_window),
            user_input,
        );

        let raw = self
            .provider
            .complete(&prompt, true)
            .await
            .map_err(|e| DialogueError::provider(OP_CONTINUE_DIALOGUE, e))?;
        let dialogue = self.normalize_reply(id, &raw);

        if !self
            .store
            .append_turn(id, Role::Character, dialogue.prose.clone())
            .await
        {
            return Err(not_found());
        }

        tracing::info!(session_id = %id, delta, affection, "continued dialogue");

        Ok(ContinueResponse {
            character_response: dialogue.prose,
            choices: dialogue.choices,
            affection,
        })
    }

    /// Summary of a live session.
    pub async fn session_info(&self, id: &str) -> Result<SessionInfo, DialogueError> {
        self.store
            .info(id)
            .await
            .ok_or_else(|| DialogueError::NotFound(id.to_string()))
    }

    /// Custom theme wins, then an explicit hint; otherwise the model picks.
    async fn resolve_theme(
        &self,
        theme_hint: Option<&str>,
        custom_theme: Option<&str>,
    ) -> Result<String, DialogueError> {
        if let Some(custom) = custom_theme.filter(|t| !t.trim().is_empty()) {
            return Ok(custom.to_string());
        }

        match theme_hint.map(str::trim) {
            Some(hint) if !hint.is_empty() && hint != AUTO_THEME => Ok(hint.to_string()),
            _ => self.generate_theme().await,
        }
    }

    async fn generate_theme(&self) -> Result<String, DialogueError> {
        let raw = self
            .provider
            .complete(&prompts::theme_prompt(), false)
            .await
            .map_err(|e| DialogueError::provider(OP_GENERATE_THEME, e))?;

        let theme = raw.trim();
        if theme.is_empty() {
            return Err(DialogueError::provider(
                OP_GENERATE_THEME,
                ProviderError::EmptyContent,
            ));
        }
        tracing::debug!(theme = %theme, "generated theme");
        Ok(theme.to_string())
    }

    fn normalize_reply(&self, id: &str, raw: &str) -> NormalizedDialogue {
        let dialogue = normalize(raw);
        if dialogue.strategy != Strategy::StrictJson {
            tracing::warn!(
                session_id = %id,
                strategy = ?dialogue.strategy,
                has_choices = dialogue.has_choices(),
                "model reply was not clean JSON"
            );
        }
        dialogue
    }
}
