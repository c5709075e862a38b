//! Source text editors and positions.
//!
//! A [`SourceEditor`] owns the text of one compilation unit together with a
//! line index, so byte offsets reported by front-ends can be turned into
//! line/column [`Position`]s. The editor's content hash is the cache key used
//! to skip rebuilding unchanged sources.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A point in a source file. Lines are 1-based, columns 0-based (in bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

/// A half-open source span `[start, end)` inside the editor identified by
/// `url`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub url: String,
    pub start: Position,
    pub end: Position,
}

impl Range {
    /// Returns `true` if the byte offset falls inside this span.
    pub fn contains_offset(&self, offset: usize) -> bool {
        self.start.offset <= offset && offset < self.end.offset
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}-{}:{}",
            self.url, self.start.line, self.start.column, self.end.line, self.end.column
        )
    }
}

/// Source text of one compilation unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEditor {
    url: String,
    source: String,
    hash: String,
    line_starts: Vec<usize>,
    /// Hashes of sources compiled while this editor was active (includes).
    included: Vec<String>,
}

impl SourceEditor {
    /// Creates an editor over `source` with an empty url.
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let hash = blake3::hash(source.as_bytes()).to_hex().to_string();
        let mut line_starts = vec![0];
        line_starts.extend(
            source
                .bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        SourceEditor {
            url: String::new(),
            source,
            hash,
            line_starts,
            included: Vec::new(),
        }
    }

    /// Builder-style url setter.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = url.into();
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Hex-encoded blake3 digest of the source text.
    pub fn source_hash(&self) -> &str {
        &self.hash
    }

    /// Records that a nested source (by hash) was compiled in this context.
    pub fn push_source_context(&mut self, hash: impl Into<String>) {
        self.included.push(hash.into());
    }

    pub fn included_hashes(&self) -> &[String] {
        &self.included
    }

    /// Converts a byte offset to a position. Offsets past the end clamp to
    /// the end of the text.
    pub fn position(&self, offset: usize) -> Position {
        let offset = offset.min(self.source.len());
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        Position {
            line: line_idx + 1,
            column: offset - self.line_starts[line_idx],
            offset,
        }
    }

    /// Builds a range for the byte span `[start, end)`.
    pub fn range(&self, start: usize, end: usize) -> Range {
        Range {
            url: self.url.clone(),
            start: self.position(start),
            end: self.position(end.max(start)),
        }
    }

    /// Returns the text covered by `range`, or an empty string when the range
    /// does not fit this editor.
    pub fn source_code(&self, range: &Range) -> &str {
        self.source
            .get(range.start.offset..range.end.offset)
            .unwrap_or("")
    }

    /// Returns the lines of `range` plus `n` lines of context on each side.
    pub fn source_code_context(&self, range: &Range, n: usize) -> String {
        let first = range.start.line.saturating_sub(n).max(1);
        let last = (range.end.line + n).min(self.line_starts.len());
        self.source
            .lines()
            .enumerate()
            .filter(|(i, _)| *i + 1 >= first && *i + 1 <= last)
            .map(|(i, line)| format!("{:>4} | {}", i + 1, line))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: &str = "a = 1\nb = a + 2\nprintln(b)\n";

    #[test]
    fn positions_follow_line_starts() {
        let editor = SourceEditor::new(SRC);
        assert_eq!(
            editor.position(0),
            Position {
                line: 1,
                column: 0,
                offset: 0
            }
        );
        let p = editor.position(8);
        assert_eq!((p.line, p.column), (2, 2));
        let end = editor.position(10_000);
        assert_eq!(end.offset, SRC.len());
    }

    #[test]
    fn source_code_of_range() {
        let editor = SourceEditor::new(SRC).with_url("main.yak");
        let range = editor.range(6, 15);
        assert_eq!(editor.source_code(&range), "b = a + 2");
        assert_eq!(range.url, "main.yak");
        assert!(range.contains_offset(6));
        assert!(!range.contains_offset(15));
    }

    #[test]
    fn hash_depends_only_on_content() {
        let a = SourceEditor::new("x = 1").with_url("a.yak");
        let b = SourceEditor::new("x = 1").with_url("b.yak");
        let c = SourceEditor::new("x = 2");
        assert_eq!(a.source_hash(), b.source_hash());
        assert_ne!(a.source_hash(), c.source_hash());
    }

    #[test]
    fn context_lines() {
        let editor = SourceEditor::new(SRC);
        let range = editor.range(6, 15);
        let ctx = editor.source_code_context(&range, 1);
        assert_eq!(ctx.lines().count(), 3);
        assert!(ctx.contains("   2 | b = a + 2"));
    }
}
