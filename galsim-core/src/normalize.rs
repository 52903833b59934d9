//! Response normalization.
//!
//! The model is asked for `{"dialogue": ..., "choices": [...]}` but is free to
//! ignore that. Normalization runs an ordered chain of parsing strategies,
//! each weaker than the last, and always produces one line of prose plus
//! exactly four choice strings. An empty choice means "no information".

use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::Value;

/// Number of choices offered on every turn.
pub const CHOICE_COUNT: usize = 4;

/// Choice labels, in the order the model is asked to emit them.
pub const CHOICE_LABELS: [char; CHOICE_COUNT] = ['A', 'B', 'C', 'D'];

/// Field names that may carry the character's line, in lookup order.
const PROSE_FIELDS: [&str; 2] = ["dialogue", "response"];

lazy_static::lazy_static! {
    static ref NEWLINE_RUN: Regex = Regex::new(r"\n+").expect("valid regex");
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").expect("valid regex");

    /// A choice label at the start of a line: `A.` `A:` `A：` `选项A：` `选项A:`.
    static ref LINE_LABEL: Regex =
        Regex::new(r"^\s*(?:选项\s*(?P<long>[A-D])\s*[:：]|(?P<short>[A-D])[.:：])")
            .expect("valid regex");

    /// A `选项X：` label appearing later on an already-labeled line.
    static ref INLINE_LABEL: Regex =
        Regex::new(r"选项\s*(?P<long>[A-D])\s*[:：]").expect("valid regex");
}

/// A model reply coerced into the fixed dialogue shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedDialogue {
    pub prose: String,
    pub choices: [String; CHOICE_COUNT],
    /// The strategy that produced this result.
    pub strategy: Strategy,
}

impl NormalizedDialogue {
    /// Whether at least one choice carries text.
    pub fn has_choices(&self) -> bool {
        self.choices.iter().any(|c| !c.is_empty())
    }
}

/// Parsing strategies, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// The whole reply is a JSON object.
    StrictJson,
    /// A JSON object is embedded in surrounding text or code fences.
    EmbeddedJson,
    /// Free text with `A.`/`选项A：` style labeled lines.
    LabeledSegments,
    /// Nothing recognizable; prose only, four empty choices.
    GiveUp,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::StrictJson,
        Strategy::EmbeddedJson,
        Strategy::LabeledSegments,
        Strategy::GiveUp,
    ];

    /// Try this strategy alone. `GiveUp` always succeeds.
    pub fn attempt(self, raw: &str) -> Option<Extracted> {
        match self {
            Strategy::StrictJson => parse_object(raw.trim()),
            Strategy::EmbeddedJson => {
                let start = raw.find('{')?;
                let end = raw.rfind('}')?;
                if end <= start {
                    return None;
                }
                parse_object(&raw[start..=end])
            }
            Strategy::LabeledSegments => {
                let choices = ordered_choices(raw)?;
                Some(Extracted {
                    prose: unlabeled_lines(raw),
                    choices,
                })
            }
            Strategy::GiveUp => Some(Extracted {
                prose: unlabeled_lines(raw),
                choices: Vec::new(),
            }),
        }
    }
}

/// Raw fields pulled out by a strategy, before cleanup and padding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    pub prose: String,
    pub choices: Vec<String>,
}

/// Normalize a raw model reply. Never fails.
pub fn normalize(raw: &str) -> NormalizedDialogue {
    for strategy in Strategy::ALL {
        if let Some(extracted) = strategy.attempt(raw) {
            return finish(extracted, strategy);
        }
    }
    finish(Extracted::default(), Strategy::GiveUp)
}

/// Collapse newline runs, then whitespace runs, then trim.
pub fn clean_text(text: &str) -> String {
    let text = NEWLINE_RUN.replace_all(text, "\n");
    let text = WHITESPACE_RUN.replace_all(&text, " ");
    text.trim().to_string()
}

fn finish(extracted: Extracted, strategy: Strategy) -> NormalizedDialogue {
    let mut cleaned = extracted.choices.iter().map(|c| clean_text(c));
    let choices = std::array::from_fn(|_| cleaned.next().unwrap_or_default());

    NormalizedDialogue {
        prose: clean_text(&extracted.prose),
        choices,
        strategy,
    }
}

fn parse_object(text: &str) -> Option<Extracted> {
    let value: Value = serde_json::from_str(text).ok()?;
    let object = value.as_object()?;

    let prose = PROSE_FIELDS
        .iter()
        .find_map(|field| object.get(*field))
        .map(value_to_text)
        .unwrap_or_default();

    let choices = match object.get("choices") {
        Some(Value::Array(items)) => items.iter().map(value_to_text).collect(),
        _ => Vec::new(),
    };

    Some(Extracted { prose, choices })
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

struct Segment {
    label: char,
    text: String,
}

fn label_of(caps: &Captures) -> Option<char> {
    caps.name("long")
        .or_else(|| caps.name("short"))
        .and_then(|m| m.as_str().chars().next())
}

fn labeled_segments(raw: &str) -> Vec<Segment> {
    let mut segments = Vec::new();

    for line in raw.lines() {
        let Some(caps) = LINE_LABEL.captures(line) else {
            continue;
        };
        let (Some(whole), Some(mut label)) = (caps.get(0), label_of(&caps)) else {
            continue;
        };

        let rest = &line[whole.end()..];
        let mut cursor = 0;
        for inline in INLINE_LABEL.captures_iter(rest) {
            let (Some(found), Some(next)) = (inline.get(0), label_of(&inline)) else {
                continue;
            };
            segments.push(Segment {
                label,
                text: rest[cursor..found.start()].to_string(),
            });
            label = next;
            cursor = found.end();
        }
        segments.push(Segment {
            label,
            text: rest[cursor..].to_string(),
        });
    }

    segments
}

/// Four non-empty segments labeled A, B, C, D in that order, or nothing.
fn ordered_choices(raw: &str) -> Option<Vec<String>> {
    let mut choices = Vec::with_capacity(CHOICE_COUNT);

    for segment in labeled_segments(raw) {
        if segment.label != CHOICE_LABELS[choices.len()] {
            continue;
        }
        let text = clean_text(&segment.text);
        if text.is_empty() {
            continue;
        }
        choices.push(text);
        if choices.len() == CHOICE_COUNT {
            return Some(choices);
        }
    }

    None
}

fn unlabeled_lines(raw: &str) -> String {
    raw.lines()
        .filter(|line| !LINE_LABEL.is_match(line))
        .collect::<Vec<_>>()
        .join("\n")
}
