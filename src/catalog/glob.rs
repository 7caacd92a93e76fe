//! Glob patterns over type and field names
//!
//! `*` matches any run of characters, including none. Every other character,
//! `?` and `[` included, matches itself.

use std::fmt;

/// A compiled glob pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobPattern {
    source: String,
    /// Literal runs between stars, folded when matching ignores case
    parts: Vec<String>,
    case_sensitive: bool,
}

impl GlobPattern {
    pub fn new(pattern: &str) -> Self {
        let mut glob = GlobPattern {
            source: pattern.to_string(),
            parts: Vec::new(),
            case_sensitive: true,
        };
        glob.compile();
        glob
    }

    /// Match ignoring case
    pub fn case_insensitive(mut self) -> Self {
        self.case_sensitive = false;
        self.compile();
        self
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// True when the pattern has no `*` and only matches itself
    pub fn is_literal(&self) -> bool {
        !self.source.contains('*')
    }

    fn compile(&mut self) {
        let case_sensitive = self.case_sensitive;
        self.parts = self
            .source
            .split('*')
            .map(|part| fold(part, case_sensitive))
            .collect();
    }

    /// Whether `text` matches the whole pattern
    pub fn matches(&self, text: &str) -> bool {
        let folded;
        let text = if self.case_sensitive {
            text
        } else {
            folded = text.to_lowercase();
            folded.as_str()
        };

        if self.parts.len() == 1 {
            return text == self.parts[0];
        }

        // First and last parts are anchored; the middle ones are found
        // left to right, each as early as possible.
        let first = &self.parts[0];
        let last = &self.parts[self.parts.len() - 1];
        if !text.starts_with(first.as_str()) {
            return false;
        }
        let mut rest = &text[first.len()..];
        if rest.len() < last.len() {
            return false;
        }
        let tail_start = rest.len() - last.len();
        if !rest.is_char_boundary(tail_start) || &rest[tail_start..] != last.as_str() {
            return false;
        }
        rest = &rest[..tail_start];

        for part in &self.parts[1..self.parts.len() - 1] {
            match rest.find(part.as_str()) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
        true
    }
}

fn fold(text: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        text.to_string()
    } else {
        text.to_lowercase()
    }
}

impl fmt::Display for GlobPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl From<&str> for GlobPattern {
    fn from(pattern: &str) -> Self {
        GlobPattern::new(pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_literal() {
        let glob = GlobPattern::new("Game.Player");
        assert!(glob.is_literal());
        assert!(glob.matches("Game.Player"));
        assert!(!glob.matches("Game.PlayerController"));
        assert!(!glob.matches("game.player"));
    }

    #[test]
    fn test_stars() {
        assert!(GlobPattern::new("*").matches(""));
        assert!(GlobPattern::new("*").matches("anything"));
        assert!(GlobPattern::new("Game.*").matches("Game."));
        assert!(GlobPattern::new("Game.*").matches("Game.Player"));
        assert!(!GlobPattern::new("Game.*").matches("UI.Game.Player"));
        assert!(GlobPattern::new("*Controller").matches("Game.PlayerController"));
        assert!(GlobPattern::new("*Player*").matches("Game.PlayerController"));
        assert!(GlobPattern::new("G*e.*r").matches("Game.Player"));
        assert!(!GlobPattern::new("G*e.*r").matches("Game.Players"));
        assert!(GlobPattern::new("**").matches("x"));
    }

    #[test]
    fn test_overlapping_anchors() {
        // Prefix and suffix may not share characters
        assert!(!GlobPattern::new("aa*aa").matches("aaa"));
        assert!(GlobPattern::new("aa*aa").matches("aaaa"));
        assert!(GlobPattern::new("a*b*a").matches("aba"));
        assert!(!GlobPattern::new("a*b*a").matches("ab"));
    }

    #[test]
    fn test_other_metacharacters_are_literal() {
        assert!(GlobPattern::new("List`1[?]").matches("List`1[?]"));
        assert!(!GlobPattern::new("List?").matches("ListX"));
    }

    #[test]
    fn test_case_insensitive() {
        let glob = GlobPattern::new("game.*CONTROLLER").case_insensitive();
        assert!(!glob.is_case_sensitive());
        assert!(glob.matches("Game.PlayerController"));
        assert!(!GlobPattern::new("game.*CONTROLLER").matches("Game.PlayerController"));
    }

    #[test]
    fn test_multibyte_text() {
        assert!(GlobPattern::new("*é").matches("Café"));
        assert!(!GlobPattern::new("*e").matches("Café"));
        assert!(GlobPattern::new("Ω*").matches("Ωmega"));
    }

    proptest! {
        #[test]
        fn prop_star_matches_everything(text in ".*") {
            prop_assert!(GlobPattern::new("*").matches(&text));
        }

        #[test]
        fn prop_literal_matches_only_itself(a in "[A-Za-z.]{0,12}", b in "[A-Za-z.]{0,12}") {
            let glob = GlobPattern::new(&a);
            prop_assert!(glob.matches(&a));
            prop_assert_eq!(glob.matches(&b), a == b);
        }

        #[test]
        fn prop_prefix_and_suffix(prefix in "[a-z]{0,6}", middle in "[a-z.]{0,6}", suffix in "[a-z]{0,6}") {
            let text = format!("{}{}{}", prefix, middle, suffix);
            let starts = format!("{}*", prefix);
            let ends = format!("*{}", suffix);
            let around = format!("{}*{}", prefix, suffix);
            prop_assert!(GlobPattern::new(&starts).matches(&text));
            prop_assert!(GlobPattern::new(&ends).matches(&text));
            prop_assert!(GlobPattern::new(&around).matches(&text));
        }
    }
}
