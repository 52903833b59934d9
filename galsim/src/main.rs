//! Galgame dialogue simulator.
//!
//! Plays a visual-novel conversation with an LLM-driven character over a
//! line-oriented terminal protocol:
//!
//! ```bash
//! cargo run -p galsim -- --theme 校园恋爱
//! cargo run -p galsim -- --custom-theme "雨夜的便利店"
//! ```
//!
//! Configuration comes from the environment (or a `.env` file); see
//! [`galsim_core::GalConfig`].

mod headless;

use anyhow::{Context, Result};
use clap::Parser;
use galsim_core::{DialogueEngine, GalConfig, SessionStore};
use headless::ThemeOptions;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "galsim", version, about = "Visual-novel dialogue with an LLM character")]
struct Cli {
    /// Theme for new conversations; "auto" lets the model invent one.
    #[arg(long, default_value = "auto")]
    theme: String,

    /// Free-form theme that takes precedence over --theme.
    #[arg(long)]
    custom_theme: Option<String>,

    /// Seconds between sweeps of expired sessions.
    #[arg(long, default_value_t = 300, value_parser = clap::value_parser!(u64).range(1..))]
    sweep_interval_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Logs go to stderr so stdout stays the conversation
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("galsim=info".parse()?)
                .add_directive("galsim_core=info".parse()?),
        )
        .init();

    let config = GalConfig::from_env().context("invalid configuration")?;
    tracing::info!(
        model = %config.model,
        base_url = %config.base_url,
        session_timeout_secs = config.session_timeout_secs,
        "configuration loaded"
    );

    let engine = DialogueEngine::from_config(&config);
    let sweeper = spawn_sweeper(
        engine.store().clone(),
        Duration::from_secs(cli.sweep_interval_secs),
    );

    let options = ThemeOptions {
        theme: Some(cli.theme),
        custom_theme: cli.custom_theme,
    };
    let result = headless::run_headless(&engine, options).await;

    sweeper.abort();
    result.context("dialogue failed")
}

/// Periodically drop sessions idle past the timeout.
fn spawn_sweeper(store: Arc<SessionStore>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = store.sweep_expired().await;
            tracing::debug!(removed, "sweep finished");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["galsim"]).unwrap();
        assert_eq!(cli.theme, "auto");
        assert!(cli.custom_theme.is_none());
        assert_eq!(cli.sweep_interval_secs, 300);
    }

    #[test]
    fn test_cli_rejects_zero_interval() {
        assert!(Cli::try_parse_from(["galsim", "--sweep-interval-secs", "0"]).is_err());
    }

    #[test]
    fn test_cli_custom_theme() {
        let cli = Cli::try_parse_from(["galsim", "--custom-theme", "夏日祭"]).unwrap();
        assert_eq!(cli.custom_theme.as_deref(), Some("夏日祭"));
    }
}
