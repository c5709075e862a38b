//! String predicates and search modes.

use std::ops::BitOr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::QueryError;

/// Which parts of a value a search compares.
///
/// `NAME` tests the value itself. `KEY` tests the keys of an object's
/// members and yields the matching members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchMode(u8);

impl SearchMode {
    pub const NAME: SearchMode = SearchMode(1);
    pub const KEY: SearchMode = SearchMode(1 << 1);
    pub const ALL: SearchMode = SearchMode(Self::NAME.0 | Self::KEY.0);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: SearchMode) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for SearchMode {
    fn default() -> Self {
        SearchMode::NAME
    }
}

impl BitOr for SearchMode {
    type Output = SearchMode;

    fn bitor(self, rhs: SearchMode) -> SearchMode {
        SearchMode(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone)]
pub enum Matcher {
    Exact(String),
    /// `*` and `?` wildcards, anchored at both ends.
    Glob { pattern: String, regex: Regex },
    /// Unanchored regular expression.
    Regex(Regex),
}

impl Matcher {
    pub fn exact(text: impl Into<String>) -> Self {
        Matcher::Exact(text.into())
    }

    pub fn glob(pattern: &str) -> Result<Self, QueryError> {
        let mut translated = String::with_capacity(pattern.len() + 2);
        translated.push('^');
        let mut literal = String::new();
        for c in pattern.chars() {
            match c {
                '*' | '?' => {
                    translated.push_str(&regex::escape(&literal));
                    literal.clear();
                    translated.push_str(if c == '*' { ".*" } else { "." });
                }
                _ => literal.push(c),
            }
        }
        translated.push_str(&regex::escape(&literal));
        translated.push('$');
        let regex = compile(&translated, pattern)?;
        Ok(Matcher::Glob {
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn regex(pattern: &str) -> Result<Self, QueryError> {
        Ok(Matcher::Regex(compile(pattern, pattern)?))
    }

    pub fn pattern(&self) -> &str {
        match self {
            Matcher::Exact(text) => text,
            Matcher::Glob { pattern, .. } => pattern,
            Matcher::Regex(regex) => regex.as_str(),
        }
    }

    pub fn is_match(&self, text: &str) -> bool {
        match self {
            Matcher::Exact(expected) => expected == text,
            Matcher::Glob { regex, .. } | Matcher::Regex(regex) => regex.is_match(text),
        }
    }
}

fn compile(source: &str, pattern: &str) -> Result<Regex, QueryError> {
    Regex::new(source).map_err(|source| QueryError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_combine() {
        assert!(SearchMode::ALL.contains(SearchMode::NAME));
        assert!(SearchMode::ALL.contains(SearchMode::KEY));
        assert!(!SearchMode::NAME.contains(SearchMode::KEY));
        assert_eq!(SearchMode::NAME | SearchMode::KEY, SearchMode::ALL);
        assert_eq!(SearchMode::default(), SearchMode::NAME);
    }

    #[test]
    fn glob_is_anchored_and_escapes_metacharacters() {
        let m = Matcher::glob("get*.v?").unwrap();
        assert!(m.is_match("getUser.v1"));
        assert!(m.is_match("get.v2"));
        assert!(!m.is_match("xgetUser.v1"));
        assert!(!m.is_match("getUserXv1"));
        assert_eq!(m.pattern(), "get*.v?");
    }

    #[test]
    fn regex_is_unanchored() {
        let m = Matcher::regex("exec|system").unwrap();
        assert!(m.is_match("os.system"));
        assert!(!m.is_match("print"));
    }

    #[test]
    fn exact_compares_whole_text() {
        let m = Matcher::exact("alice");
        assert!(m.is_match("alice"));
        assert!(!m.is_match("alice2"));
    }

    #[test]
    fn bad_regex_is_reported() {
        let err = Matcher::regex("(unclosed").unwrap_err();
        assert!(matches!(err, QueryError::InvalidPattern { ref pattern, .. } if pattern == "(unclosed"));
    }
}
