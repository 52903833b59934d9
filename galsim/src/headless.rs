//! Headless player.
//!
//! A line-oriented protocol for playing from a terminal or driving the
//! engine from scripts:
//! - `A`-`D` picks the matching choice and sends its text
//! - Lines starting with `#` are commands (info, restart, theme, help, quit)
//! - Anything else is sent to the character verbatim

use galsim_core::normalize::{CHOICE_COUNT, CHOICE_LABELS};
use galsim_core::{DialogueEngine, DialogueError, LlmProvider};
use std::io::{self, BufRead, Write};

/// How new sessions pick their theme.
#[derive(Debug, Clone, Default)]
pub struct ThemeOptions {
    pub theme: Option<String>,
    pub custom_theme: Option<String>,
}

/// One parsed line of player input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Pick the choice at this index.
    Choice(usize),
    /// Free text for the character.
    Say(String),
    Command(Command),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Info,
    Restart(Option<String>),
    Theme(String),
    Help,
    Quit,
    Unknown(String),
}

/// Parse one non-empty, trimmed input line.
pub fn parse_line(line: &str) -> Input {
    if let Some(rest) = line.strip_prefix('#') {
        let rest = rest.trim();
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, Some(arg.trim().to_string()).filter(|a| !a.is_empty())),
            None => (rest, None),
        };
        let command = match (name, arg) {
            ("info" | "status", _) => Command::Info,
            ("restart" | "new", theme) => Command::Restart(theme),
            ("theme", Some(theme)) => Command::Theme(theme),
            ("help", _) => Command::Help,
            ("quit" | "exit", _) => Command::Quit,
            _ => Command::Unknown(rest.to_string()),
        };
        return Input::Command(command);
    }

    let mut chars = line.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        let upper = c.to_ascii_uppercase();
        if let Some(index) = CHOICE_LABELS.iter().position(|&l| l == upper) {
            return Input::Choice(index);
        }
    }
    Input::Say(line.to_string())
}

struct Player<'a, P> {
    engine: &'a DialogueEngine<P>,
    options: ThemeOptions,
    session_id: String,
    choices: [String; CHOICE_COUNT],
    theme_override: Option<String>,
}

impl<'a, P: LlmProvider> Player<'a, P> {
    async fn start(
        engine: &'a DialogueEngine<P>,
        options: ThemeOptions,
    ) -> Result<Self, DialogueError> {
        let start = engine
            .start_new(options.theme.as_deref(), options.custom_theme.as_deref())
            .await?;

        println!("[THEME] {}", start.theme);
        print_turn(&start.initial_dialogue, &start.choices, start.affection);

        Ok(Self {
            engine,
            options,
            session_id: start.session_id,
            choices: start.choices,
            theme_override: None,
        })
    }

    async fn restart(&mut self, theme: Option<String>) -> Result<(), DialogueError> {
        let (hint, custom) = match &theme {
            Some(theme) => (Some(theme.as_str()), None),
            None => (
                self.options.theme.as_deref(),
                self.options.custom_theme.as_deref(),
            ),
        };
        let start = self.engine.start_new(hint, custom).await?;

        self.engine.store().delete(&self.session_id).await;
        self.session_id = start.session_id;
        self.choices = start.choices.clone();
        self.theme_override = None;

        println!("[THEME] {}", start.theme);
        print_turn(&start.initial_dialogue, &start.choices, start.affection);
        Ok(())
    }

    async fn say(&mut self, text: &str) -> Result<(), DialogueError> {
        let turn = self
            .engine
            .continue_dialogue(&self.session_id, text, self.theme_override.as_deref())
            .await?;

        self.theme_override = None;
        print_turn(&turn.character_response, &turn.choices, turn.affection);
        self.choices = turn.choices;
        Ok(())
    }

    async fn info(&self) -> Result<(), DialogueError> {
        let info = self.engine.session_info(&self.session_id).await?;
        println!("[INFO]");
        println!("  Session: {}", info.session_id);
        println!("  Theme: {}", info.theme);
        println!("  Affection: {}", info.affection);
        println!("  History: {} entries", info.history_length);
        println!("  Started: {}", info.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
        println!("  Last active: {}", info.last_accessed.format("%Y-%m-%d %H:%M:%S UTC"));
        Ok(())
    }
}

/// Run the headless player until `#quit` or end of input.
pub async fn run_headless<P: LlmProvider>(
    engine: &DialogueEngine<P>,
    options: ThemeOptions,
) -> Result<(), DialogueError> {
    println!("=== Galgame Headless Mode ===");
    println!();

    let mut player = Player::start(engine, options).await?;

    println!();
    print_help();
    println!();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                eprintln!("Error reading input: {e}");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let result = match parse_line(line) {
            Input::Command(Command::Quit) => {
                println!("Goodbye!");
                break;
            }
            Input::Command(Command::Help) => {
                print_help();
                Ok(())
            }
            Input::Command(Command::Info) => player.info().await,
            Input::Command(Command::Restart(theme)) => player.restart(theme).await,
            Input::Command(Command::Theme(theme)) => {
                println!("[THEME] Next turn continues under \"{theme}\"");
                player.theme_override = Some(theme);
                Ok(())
            }
            Input::Command(Command::Unknown(_)) => {
                println!("[ERROR] Unknown command. Type #help for help.");
                Ok(())
            }
            Input::Choice(index) => {
                let choice = player.choices[index].clone();
                if choice.is_empty() {
                    println!(
                        "[ERROR] Choice {} has no text this turn; type a reply instead.",
                        CHOICE_LABELS[index]
                    );
                    Ok(())
                } else {
                    println!("[YOU] {choice}");
                    player.say(&choice).await
                }
            }
            Input::Say(text) => player.say(&text).await,
        };

        match result {
            Ok(()) => {}
            Err(DialogueError::NotFound(_)) => {
                println!("[ERROR] The session has expired. Type #restart to begin again.");
            }
            Err(e) => println!("[ERROR] {e}"),
        }
        stdout.flush().ok();
    }

    Ok(())
}

fn print_turn(text: &str, choices: &[String; CHOICE_COUNT], affection: u8) {
    println!("[CHARACTER]");
    println!("{text}");
    println!();
    if choices.iter().any(|c| !c.is_empty()) {
        for (label, choice) in CHOICE_LABELS.iter().zip(choices) {
            println!("  {label}. {choice}");
        }
    } else {
        println!("  (no choices offered; type your reply)");
    }
    println!("[AFFECTION] {affection}");
}

fn print_help() {
    println!("Commands:");
    println!("  A-D             - Pick a choice");
    println!("  #info           - Show session info");
    println!("  #restart [theme] - Start a new conversation");
    println!("  #theme <theme>  - Change the theme from the next turn");
    println!("  #help           - Show this help");
    println!("  #quit           - Exit");
    println!("  (anything else is said to the character)");
}
