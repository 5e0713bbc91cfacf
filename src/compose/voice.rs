//! Voice enforcement: a consultative, non-hedging tone
//!
//! A pure text transform applied to plain text before it is placed in markup.

use once_cell::sync::Lazy;
use regex::Regex;

/// One rewrite: every match of `pattern` becomes `replacement`.
#[derive(Debug, Clone)]
pub struct VoiceRule {
    pattern: Regex,
    replacement: &'static str,
}

impl VoiceRule {
    fn new(pattern: &str, replacement: &'static str) -> Self {
        Self {
            pattern: Regex::new(pattern).expect("built-in voice rule"),
            replacement,
        }
    }
}

static STANDARD_RULES: Lazy<Vec<VoiceRule>> = Lazy::new(|| {
    vec![
        VoiceRule::new(r"(?i)\b(it (seems|appears) that|we believe( that)?|in our (opinion|view),?|i think( that)?)\s*", ""),
        VoiceRule::new(r"(?i)\b(perhaps|possibly|arguably|somewhat|potentially|presumably)\b\s*,?\s*", ""),
        VoiceRule::new(r"\bmight\b", "can"),
        VoiceRule::new(r"\bMight\b", "Can"),
        VoiceRule::new(r"(?i)\bkind of\s+|\bsort of\s+", ""),
        VoiceRule::new(r"!+", "."),
        VoiceRule::new(r"\s+([,.;:])", "$1"),
        VoiceRule::new(r"\s+", " "),
    ]
});

#[derive(Debug, Clone)]
pub struct Voice {
    rules: Vec<VoiceRule>,
}

impl Default for Voice {
    fn default() -> Self {
        Self::standard()
    }
}

impl Voice {
    pub fn standard() -> Self {
        Self {
            rules: STANDARD_RULES.clone(),
        }
    }

    /// Apply every rule in order, then capitalize the first letter.
    pub fn apply(&self, text: &str) -> String {
        let mut out = text.to_string();
        for rule in &self.rules {
            out = rule.pattern.replace_all(&out, rule.replacement).into_owned();
        }
        capitalize(out.trim())
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hedges_are_removed() {
        let voice = Voice::standard();
        assert_eq!(
            voice.apply("it seems that margins are perhaps under pressure"),
            "Margins are under pressure"
        );
        assert_eq!(voice.apply("We believe the CFO might push for cuts!"), "The CFO can push for cuts.");
    }

    #[test]
    fn spacing_before_punctuation_is_tightened() {
        assert_eq!(Voice::standard().apply("Costs rose , possibly , sharply ."), "Costs rose, sharply.");
    }

    #[test]
    fn plain_text_is_unchanged_apart_from_case() {
        let voice = Voice::standard();
        assert_eq!(voice.apply("revenue grew 8% in FY2024"), "Revenue grew 8% in FY2024");
        assert_eq!(voice.apply("   "), "");
    }

    #[test]
    fn is_idempotent() {
        let voice = Voice::standard();
        let once = voice.apply("Arguably, the board might act soon!");
        assert_eq!(voice.apply(&once), once);
    }
}
