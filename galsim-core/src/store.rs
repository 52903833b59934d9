//! In-memory session store.
//!
//! One table of sessions behind one async mutex. Every operation takes the
//! gate once and releases it before returning; nothing awaits I/O while the
//! gate is held. Operations do not compose: a session can expire between a
//! `get` and a following `append_turn`, in which case the latter is a no-op
//! and reports `false`.
//!
//! Expiry is lazy. A session idle longer than the timeout is dropped the next
//! time a lookup touches it, or when a caller runs [`SessionStore::sweep_expired`].

use crate::affection::{apply_delta, AFFECTION_DEFAULT};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Default idle timeout in seconds.
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 3600;

/// Default cap on stored history entries per session.
pub const DEFAULT_MAX_HISTORY: usize = 50;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Who said a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Character,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Character => "character",
        }
    }
}

/// One history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Conversation state for one play-through.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: String,
    pub theme: String,
    pub history: VecDeque<Turn>,
    pub affection: u8,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub max_history: usize,
}

impl Session {
    fn new(id: String, theme: String, max_history: usize, now: DateTime<Utc>) -> Self {
        Self {
            id,
            theme,
            history: VecDeque::new(),
            affection: AFFECTION_DEFAULT,
            created_at: now,
            last_accessed: now,
            max_history,
        }
    }

    /// The most recent `window` turns, oldest first.
    pub fn recent_turns(&self, window: usize) -> impl Iterator<Item = &Turn> {
        let skip = self.history.len().saturating_sub(window);
        self.history.iter().skip(skip)
    }

    fn push_turn(&mut self, role: Role, content: String, now: DateTime<Utc>) {
        self.history.push_back(Turn {
            role,
            content,
            timestamp: now,
        });
        while self.history.len() > self.max_history {
            self.history.pop_front();
        }
        self.last_accessed = now;
    }

    fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.id.clone(),
            theme: self.theme.clone(),
            history_length: self.history.len(),
            created_at: self.created_at,
            last_accessed: self.last_accessed,
            affection: self.affection,
        }
    }
}

/// Public summary of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub theme: String,
    pub history_length: usize,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub affection: u8,
}

/// The session table.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    timeout: Duration,
    max_history: usize,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    /// Create a store with the default timeout and history cap.
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_SESSION_TIMEOUT_SECS, DEFAULT_MAX_HISTORY)
    }

    /// Create a store with a custom idle timeout (seconds) and history cap.
    pub fn with_limits(timeout_secs: u64, max_history: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            timeout: Duration::try_seconds(i64::try_from(timeout_secs).unwrap_or(i64::MAX))
                .unwrap_or(Duration::MAX),
            max_history: max_history.max(1),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// Create a fresh session, replacing any existing one with the same id.
    pub async fn create(&self, id: impl Into<String>, theme: impl Into<String>) -> Session {
        let id = id.into();
        let session = Session::new(id.clone(), theme.into(), self.max_history, self.clock.now());

        let mut sessions = self.sessions.lock().await;
        if sessions.insert(id.clone(), session.clone()).is_some() {
            tracing::debug!(session_id = %id, "replaced existing session");
        }
        session
    }

    /// Snapshot of a live session. Expired sessions are removed and reported absent.
    ///
    /// Does not refresh the last-access time.
    pub async fn get(&self, id: &str) -> Option<Session> {
        let mut sessions = self.sessions.lock().await;
        self.live_entry(&mut sessions, id).map(|s| s.clone())
    }

    /// Summary of a live session, with the same expiry rules as [`Self::get`].
    pub async fn info(&self, id: &str) -> Option<SessionInfo> {
        let mut sessions = self.sessions.lock().await;
        self.live_entry(&mut sessions, id).map(|s| s.info())
    }

    /// Append a turn. Returns `false` if the session is absent or expired.
    pub async fn append_turn(&self, id: &str, role: Role, text: impl Into<String>) -> bool {
        let now = self.clock.now();
        let mut sessions = self.sessions.lock().await;
        match self.live_entry(&mut sessions, id) {
            Some(session) => {
                session.push_turn(role, text.into(), now);
                true
            }
            None => false,
        }
    }

    /// Add `delta` to the affection, clamped. Returns the new value.
    pub async fn adjust_affection(&self, id: &str, delta: i32) -> Option<u8> {
        let now = self.clock.now();
        let mut sessions = self.sessions.lock().await;
        let session = self.live_entry(&mut sessions, id)?;
        session.affection = apply_delta(session.affection, delta);
        session.last_accessed = now;
        Some(session.affection)
    }

    /// Overwrite the theme. Returns `false` if the session is absent or expired.
    pub async fn set_theme(&self, id: &str, theme: impl Into<String>) -> bool {
        let now = self.clock.now();
        let mut sessions = self.sessions.lock().await;
        match self.live_entry(&mut sessions, id) {
            Some(session) => {
                session.theme = theme.into();
                session.last_accessed = now;
                true
            }
            None => false,
        }
    }

    pub async fn delete(&self, id: &str) -> bool {
        self.sessions.lock().await.remove(id).is_some()
    }

    /// Remove every session idle beyond the timeout. Returns how many went.
    pub async fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, session| !self.is_expired(session, now));
        let removed = before - sessions.len();
        if removed > 0 {
            tracing::info!(removed, remaining = sessions.len(), "swept expired sessions");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    fn is_expired(&self, session: &Session, now: DateTime<Utc>) -> bool {
        now - session.last_accessed > self.timeout
    }

    /// Look up `id` inside an already-held gate, evicting it if expired.
    fn live_entry<'a>(
        &self,
        sessions: &'a mut HashMap<String, Session>,
        id: &str,
    ) -> Option<&'a mut Session> {
        let expired = self.is_expired(sessions.get(id)?, self.clock.now());
        if expired {
            sessions.remove(id);
            tracing::info!(session_id = %id, "session expired");
            return None;
        }
        sessions.get_mut(id)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
