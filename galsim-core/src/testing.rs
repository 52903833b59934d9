//! Testing utilities.
//!
//! This module provides tools for testing without network access:
//! - `MockProvider` returns scripted model replies and records every prompt
//! - `ManualClock` lets tests move time forward to expire sessions
//! - `TestHarness` wires both into a ready-to-use engine

use crate::dialogue::DialogueEngine;
use crate::provider::{LlmProvider, ProviderError};
use crate::store::{Clock, SessionStore};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A prompt the mock provider received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPrompt {
    pub prompt: String,
    pub want_json: bool,
}

/// A provider that returns scripted replies in order.
///
/// Once the script runs out every call fails with
/// [`ProviderError::Unavailable`], so a test that makes one call too many
/// notices.
#[derive(Default)]
pub struct MockProvider {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    prompts: Mutex<Vec<RecordedPrompt>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a provider that answers with `replies` in order.
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let provider = Self::new();
        for reply in replies {
            provider.push_reply(reply);
        }
        provider
    }

    /// Queue a successful reply.
    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        self.push_reply(reply);
        self
    }

    /// Queue a failure.
    pub fn with_failure(self, error: ProviderError) -> Self {
        lock(&self.replies).push_back(Err(error));
        self
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        lock(&self.replies).push_back(Ok(reply.into()));
    }

    /// Every prompt received so far, oldest first.
    pub fn prompts(&self) -> Vec<RecordedPrompt> {
        lock(&self.prompts).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.prompts).len()
    }

    /// Scripted replies not yet consumed.
    pub fn remaining(&self) -> usize {
        lock(&self.replies).len()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn complete(&self, prompt: &str, want_json: bool) -> Result<String, ProviderError> {
        lock(&self.prompts).push(RecordedPrompt {
            prompt: prompt.to_string(),
            want_json,
        });

        lock(&self.replies).pop_front().unwrap_or_else(|| {
            Err(ProviderError::Unavailable(
                "mock provider has no more scripted replies".to_string(),
            ))
        })
    }
}

/// A clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock stopped at the current wall-clock time.
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(at: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(at) }
    }

    pub fn advance_secs(&self, secs: u64) {
        let step = Duration::try_seconds(i64::try_from(secs).unwrap_or(i64::MAX))
            .unwrap_or(Duration::MAX);
        let mut now = lock(&self.now);
        *now = now.checked_add_signed(step).unwrap_or(DateTime::<Utc>::MAX_UTC);
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *lock(&self.now) = at;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.now)
    }
}

/// An engine backed by a [`MockProvider`] and a [`ManualClock`].
pub struct TestHarness {
    pub engine: DialogueEngine<MockProvider>,
    pub clock: Arc<ManualClock>,
}

impl TestHarness {
    /// Create a harness whose provider answers with `replies` in order.
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_provider(MockProvider::with_replies(replies))
    }

    pub fn with_provider(provider: MockProvider) -> Self {
        Self::with_store_limits(
            provider,
            crate::store::DEFAULT_SESSION_TIMEOUT_SECS,
            crate::store::DEFAULT_MAX_HISTORY,
        )
    }

    /// Create a harness with a custom session timeout and history cap.
    pub fn with_store_limits(provider: MockProvider, timeout_secs: u64, max_history: usize) -> Self {
        let clock = Arc::new(ManualClock::new());
        let store = SessionStore::with_limits(timeout_secs, max_history).with_clock(clock.clone());
        let engine = DialogueEngine::new(provider, Arc::new(store));
        Self { engine, clock }
    }

    pub fn provider(&self) -> &MockProvider {
        self.engine.provider()
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        self.engine.store()
    }

    /// Queue another reply after construction.
    pub fn expect_reply(&self, reply: impl Into<String>) -> &Self {
        self.provider().push_reply(reply);
        self
    }

    /// The last prompt sent to the provider.
    pub fn last_prompt(&self) -> Option<String> {
        self.provider().prompts().pop().map(|p| p.prompt)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
