//! Dialogue engine for an LLM-driven visual-novel character.
//!
//! This crate provides:
//! - A session store with idle expiry and bounded history
//! - A normalizer that turns unreliable model output into prose plus four choices
//! - An affection heuristic scored from the player's choice text
//! - A dialogue engine sequencing theme, prompt, model call and bookkeeping
//!
//! # Quick Start
//!
//! ```ignore
//! use galsim_core::{DialogueEngine, GalConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GalConfig::from_env()?;
//!     let engine = DialogueEngine::from_config(&config);
//!
//!     let start = engine.start_new(Some("auto"), None).await?;
//!     println!("{}", start.initial_dialogue);
//!
//!     let reply = engine
//!         .continue_dialogue(&start.session_id, &start.choices[0], None)
//!         .await?;
//!     println!("{} (affection {})", reply.character_response, reply.affection);
//!     Ok(())
//! }
//! ```

pub mod affection;
pub mod config;
pub mod dialogue;
pub mod normalize;
pub mod prompts;
pub mod provider;
pub mod store;
pub mod testing;

// Primary public API
pub use affection::{compute_delta, ChoiceTier};
pub use config::{ConfigError, GalConfig};
pub use dialogue::{ContinueResponse, DialogueEngine, DialogueError, StartResponse};
pub use normalize::{normalize, NormalizedDialogue, Strategy};
pub use provider::{LlmProvider, ProviderError};
pub use store::{Clock, Role, Session, SessionInfo, SessionStore, SystemClock, Turn};
pub use testing::{ManualClock, MockProvider, TestHarness};
