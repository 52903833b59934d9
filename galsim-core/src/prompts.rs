//! Prompt construction.
//!
//! Templates live next to this file and are compiled in. Placeholders are
//! `{name}` tokens; braces that do not name a known placeholder (such as the
//! JSON examples) are left alone, and substituted values are never rescanned.

use crate::store::Turn;

const THEME_TEMPLATE: &str = include_str!("prompts/theme.txt");
const OPENING_TEMPLATE: &str = include_str!("prompts/opening.txt");
const CONTINUATION_TEMPLATE: &str = include_str!("prompts/continuation.txt");
const AFFECTION_RULES: &str = include_str!("prompts/affection_rules.txt");

/// Default number of history turns shown to the model.
pub const DEFAULT_HISTORY_WINDOW: usize = 10;

/// Prompt asking for a fresh conversation theme.
pub fn theme_prompt() -> String {
    THEME_TEMPLATE.trim().to_string()
}

/// Prompt asking for the opening line and first four choices.
pub fn opening_prompt(theme: &str) -> String {
    render(
        OPENING_TEMPLATE,
        &[("theme", theme), ("affection_rules", AFFECTION_RULES)],
    )
}

/// Prompt asking the character to answer the player's choice.
///
/// `history` is rendered as given; callers pass the window they want shown,
/// oldest first.
pub fn continuation_prompt<'a>(
    theme: &str,
    history: impl IntoIterator<Item = &'a Turn>,
    user_choice: &str,
) -> String {
    let history = format_history(history);
    render(
        CONTINUATION_TEMPLATE,
        &[
            ("theme", theme),
            ("history", &history),
            ("user_choice", user_choice),
            ("affection_rules", AFFECTION_RULES),
        ],
    )
}

/// Render turns as `user: <text>` / `character: <text>` lines.
pub fn format_history<'a>(turns: impl IntoIterator<Item = &'a Turn>) -> String {
    turns
        .into_iter()
        .map(|turn| format!("{}: {}", turn.role.as_str(), turn.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let substituted = after.find('}').and_then(|close| {
            let key = &after[..close];
            values
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (*value, close))
        });
        match substituted {
            Some((value, close)) => {
                out.push_str(value.trim_end());
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Role;
    use chrono::Utc;

    fn turn(role: Role, content: &str) -> Turn {
        Turn {
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_render_known_and_unknown_placeholders() {
        let rendered = render("a {x} {\"k\": 1} {y}", &[("x", "1"), ("y", "{x}")]);
        assert_eq!(rendered, "a 1 {\"k\": 1} {x}");
    }

    #[test]
    fn test_opening_prompt() {
        let prompt = opening_prompt("校园恋爱");
        assert!(prompt.contains("\"校园恋爱\""));
        assert!(prompt.contains("\"dialogue\""));
        assert!(prompt.contains("好感度+3"));
        assert!(!prompt.contains("{theme}"));
        assert!(!prompt.contains("{affection_rules}"));
    }

    #[test]
    fn test_continuation_prompt() {
        let history = vec![
            turn(Role::Character, "你好呀"),
            turn(Role::User, "一起去图书馆吧"),
        ];
        let prompt = continuation_prompt("校园恋爱", &history, "一起去图书馆吧");

        assert!(prompt.contains("character: 你好呀\nuser: 一起去图书馆吧"));
        assert!(prompt.contains("用户选择了：一起去图书馆吧"));
        assert!(prompt.contains("\"response\""));
    }

    #[test]
    fn test_format_history_empty() {
        assert_eq!(format_history(&Vec::<Turn>::new()), "");
    }

    #[test]
    fn test_theme_prompt() {
        let prompt = theme_prompt();
        assert!(prompt.starts_with("请生成"));
        assert!(prompt.ends_with("不要其他内容。"));
    }
}
