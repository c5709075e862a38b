//! Build diagnostics attached to a program.
//!
//! Malformed or unsupported source constructs never abort a build; the
//! builder records an [`SsaDiagnostic`] with a severity, a tag and the
//! offending source range, and keeps going.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::editor::Range;

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Error,
    Warn,
    Info,
}

/// What produced the diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorTag {
    /// Front-end could not parse the source.
    Syntax,
    /// A variable was read before any definition reached it.
    UndefinedValue,
    /// A member was read from an object that has no such key.
    UndefinedMember,
    /// A construct the front-end or builder does not support.
    Unsupported,
    /// An internal consistency warning.
    Consistency,
    /// Free-form tag supplied by a front-end.
    Other(String),
}

impl fmt::Display for ErrorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorTag::Syntax => write!(f, "syntax"),
            ErrorTag::UndefinedValue => write!(f, "undefined-value"),
            ErrorTag::UndefinedMember => write!(f, "undefined-member"),
            ErrorTag::Unsupported => write!(f, "unsupported"),
            ErrorTag::Consistency => write!(f, "consistency"),
            ErrorTag::Other(tag) => write!(f, "{}", tag),
        }
    }
}

/// A single tagged diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SsaDiagnostic {
    pub kind: ErrorKind,
    pub tag: ErrorTag,
    pub message: String,
    pub range: Option<Range>,
}

impl fmt::Display for SsaDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.range {
            Some(range) => write!(f, "[{:?}] {} ({}): {}", self.kind, self.tag, range, self.message),
            None => write!(f, "[{:?}] {}: {}", self.kind, self.tag, self.message),
        }
    }
}
