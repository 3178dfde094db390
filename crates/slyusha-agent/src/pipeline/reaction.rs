//! Maps arbitrary emoji input onto Telegram's fixed reaction set.

use std::sync::LazyLock;

use regex::Regex;

/// Reactions the Bot API accepts for `ReactionTypeEmoji`.
pub const ALLOWED_REACTIONS: &[&str] = &[
    "👍", "👎", "❤", "🔥", "🥰", "👏", "😁", "🤔", "🤯", "😱", "🤬", "😢", "🎉", "🤩", "🤮",
    "💩", "🙏", "👌", "🕊", "🤡", "🥱", "🥴", "😍", "🐳", "❤\u{200d}🔥", "🌚", "🌭", "💯",
    "🤣", "⚡", "🍌", "🏆", "💔", "🤨", "😐", "🍓", "🍾", "💋", "🖕", "😈", "😴", "😭", "🤓",
    "👻", "👨\u{200d}💻", "👀", "🎃", "🙈", "😇", "😨", "🤝", "✍", "🤗", "🫡", "🎅", "🎄",
    "☃", "💅", "🤪", "🗿", "🆒", "💘", "🙉", "🦄", "😘", "💊", "🙊", "😎", "👾",
    "🤷\u{200d}♂", "🤷", "🤷\u{200d}♀", "😡",
];

static CODEPOINT_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?i)U\+([0-9A-F]{4,6})").unwrap()
});

/// Canonicalize `input` to an allowed reaction, or `None` if it is not one.
pub fn canonicalize(input: &str) -> Option<&'static str> {
    let candidate = decode_codepoints(input);
    if candidate.is_empty() {
        return None;
    }

    if let Some(exact) = ALLOWED_REACTIONS.iter().find(|r| **r == candidate) {
        return Some(exact);
    }

    let stripped = strip_variation_selectors(&candidate);
    ALLOWED_REACTIONS
        .iter()
        .find(|r| strip_variation_selectors(r) == stripped)
        .copied()
}

/// Replace `U+XXXX` tokens with their characters and drop whitespace.
fn decode_codepoints(input: &str) -> String {
    let decoded = CODEPOINT_TOKEN.replace_all(input, |caps: &regex::Captures<'_>| {
        u32::from_str_radix(&caps[1], 16)
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });
    decoded.chars().filter(|c| !c.is_whitespace()).collect()
}

fn is_variation_selector(c: char) -> bool {
    matches!(c, '\u{fe00}'..='\u{fe0f}' | '\u{e0100}'..='\u{e01ef}')
}

/// Remove variation selectors; zero-width joiners are kept.
fn strip_variation_selectors(s: &str) -> String {
    s.chars().filter(|c| !is_variation_selector(*c)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codepoint_tokens_decode_to_heart() {
        assert_eq!(canonicalize("U+2764 U+FE0F"), Some("❤"));
        assert_eq!(canonicalize("u+1f44d"), Some("👍"));
    }

    #[test]
    fn exact_match_returns_immediately() {
        assert_eq!(canonicalize("🔥"), Some("🔥"));
        assert_eq!(canonicalize("  🤝 "), Some("🤝"));
    }

    #[test]
    fn variation_selector_difference_is_ignored() {
        assert_eq!(canonicalize("❤\u{fe0f}"), Some("❤"));
        assert_eq!(canonicalize("☃\u{fe0f}"), Some("☃"));
        assert_eq!(canonicalize("✍\u{fe0f}"), Some("✍"));
    }

    #[test]
    fn zwj_sequences_are_preserved() {
        assert_eq!(canonicalize("🤷\u{200d}♂\u{fe0f}"), Some("🤷\u{200d}♂"));
        assert_eq!(canonicalize("❤\u{fe0f}\u{200d}🔥"), Some("❤\u{200d}🔥"));
        // Dropping the joiner yields a different sequence.
        assert_eq!(canonicalize("❤🔥"), None);
    }

    #[test]
    fn unrelated_glyphs_are_rejected() {
        assert_eq!(canonicalize("🦀"), None);
        assert_eq!(canonicalize("like"), None);
        assert_eq!(canonicalize(""), None);
        assert_eq!(canonicalize("\u{fe0f}"), None);
    }

    #[test]
    fn invalid_codepoint_token_is_left_alone() {
        assert_eq!(canonicalize("U+D800"), None);
    }
}
