//! Affection scoring.
//!
//! Affection is an integer in `[AFFECTION_MIN, AFFECTION_MAX]` tracking how the
//! character feels about the player. Each player choice moves it by a delta
//! derived from the choice text alone.

use serde::Serialize;

pub const AFFECTION_MIN: u8 = 0;
pub const AFFECTION_MAX: u8 = 100;
pub const AFFECTION_DEFAULT: u8 = 50;

const POSITIVE_KEYWORDS: &[&str] = &[
    "亲密", "拥抱", "喜欢", "爱", "支持", "温柔", "关心", "理解",
    "intimate", "hug", "like", "love", "support", "gentle", "care", "understand",
];

const NEGATIVE_KEYWORDS: &[&str] = &[
    "冷漠", "忽视", "离开", "生气", "愤怒", "讨厌",
    "cold", "ignore", "leave", "angry", "furious", "dislike",
];

/// How a choice lands with the character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChoiceTier {
    Plus3,
    Plus1,
    Neutral,
    Minus1,
    Minus3,
}

impl ChoiceTier {
    pub fn delta(self) -> i32 {
        match self {
            ChoiceTier::Plus3 => 3,
            ChoiceTier::Plus1 => 1,
            ChoiceTier::Neutral => 0,
            ChoiceTier::Minus1 => -1,
            ChoiceTier::Minus3 => -3,
        }
    }

    /// Classify a choice. Rules are checked in order, first match wins.
    ///
    /// A bare `A`/`B`/`C`/`D` anywhere in the text counts as a label, so
    /// English text such as "I Agree" scores as choice A. Keyword checks only
    /// run when no letter or explicit `好感度` marker is present.
    pub fn classify(choice: &str) -> Self {
        if choice.contains('A') || choice.contains("好感度 +3") {
            return ChoiceTier::Plus3;
        }
        if choice.contains('B') || choice.contains("好感度 +1") {
            return ChoiceTier::Plus1;
        }
        if choice.contains('C') || choice.contains("好感度 -1") {
            return ChoiceTier::Minus1;
        }
        if choice.contains('D') || choice.contains("好感度 -3") {
            return ChoiceTier::Minus3;
        }

        let lower = choice.to_lowercase();
        if POSITIVE_KEYWORDS.iter().any(|k| lower.contains(k)) {
            ChoiceTier::Plus1
        } else if NEGATIVE_KEYWORDS.iter().any(|k| lower.contains(k)) {
            ChoiceTier::Minus1
        } else {
            ChoiceTier::Neutral
        }
    }
}

/// Affection delta for a player's choice text, one of -3, -1, 0, 1, 3.
pub fn compute_delta(choice: &str) -> i32 {
    ChoiceTier::classify(choice).delta()
}

/// Apply `delta` to `current`, clamped into the affection range.
pub fn apply_delta(current: u8, delta: i32) -> u8 {
    let next = i32::from(current).saturating_add(delta);
    next.clamp(i32::from(AFFECTION_MIN), i32::from(AFFECTION_MAX)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labeled_choices() {
        assert_eq!(compute_delta("选项A: 不错"), 3);
        assert_eq!(compute_delta("B"), 1);
        assert_eq!(compute_delta("选项C"), -1);
        assert_eq!(compute_delta("D. 走开"), -3);
    }

    #[test]
    fn test_explicit_markers() {
        assert_eq!(compute_delta("陪她聊天（好感度 +3）"), 3);
        assert_eq!(compute_delta("点头（好感度 +1）"), 1);
        assert_eq!(compute_delta("叹气（好感度 -1）"), -1);
        assert_eq!(compute_delta("嘲笑她（好感度 -3）"), -3);
    }

    #[test]
    fn test_keywords() {
        assert_eq!(compute_delta("我讨厌你"), -1);
        assert_eq!(compute_delta("轻轻拥抱她"), 1);
        assert_eq!(compute_delta("i love you"), 1);
        assert_eq!(compute_delta("so cold"), -1);
        assert_eq!(compute_delta("随便"), 0);
        assert_eq!(compute_delta(""), 0);
    }

    #[test]
    fn test_letter_beats_keywords() {
        // Uppercase letters are checked before keywords, case-sensitively.
        assert_eq!(compute_delta("I Dislike this"), -3);
        assert_eq!(compute_delta("Hug her"), 1);
        assert_eq!(compute_delta("Leave"), -1);
        assert_eq!(compute_delta("Angry"), 3);
    }

    #[test]
    fn test_positive_before_negative() {
        assert_eq!(compute_delta("喜欢但是生气"), 1);
    }

    #[test]
    fn test_tier_delta() {
        assert_eq!(ChoiceTier::classify("随便").delta(), 0);
        assert_eq!(ChoiceTier::classify("A"), ChoiceTier::Plus3);
        assert_eq!(ChoiceTier::Minus3.delta(), -3);
    }

    #[test]
    fn test_apply_delta_clamps() {
        let mut affection = AFFECTION_DEFAULT;
        for _ in 0..30 {
            affection = apply_delta(affection, 3);
        }
        assert_eq!(affection, AFFECTION_MAX);

        for _ in 0..60 {
            affection = apply_delta(affection, -3);
        }
        assert_eq!(affection, AFFECTION_MIN);

        assert_eq!(apply_delta(50, i32::MAX), 100);
        assert_eq!(apply_delta(50, i32::MIN), 0);
    }
}
