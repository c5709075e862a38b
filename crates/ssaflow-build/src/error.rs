//! Build error types for ssaflow-build.

use ssaflow_core::CoreError;
use thiserror::Error;

/// Errors produced while building programs from source.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The front-end does not handle this file. Dispatch moves on to the
    /// next candidate; a project build records the file as skipped.
    #[error("skipped: {reason}")]
    Skipped { reason: String },

    /// No registered front-end accepted the file.
    #[error("no front-end accepts '{path}'")]
    NoFrontend { path: String },

    /// The front-end reported a fatal problem with the file.
    #[error("front-end error in '{file}': {message}")]
    Frontend { file: String, message: String },

    /// A source file could not be found.
    #[error("source not found: '{path}'")]
    MissingSource { path: String },

    /// The build of one file panicked; converted at the file boundary.
    #[error("build of '{file}' panicked: {message}")]
    Panicked { file: String, message: String },

    /// A builder call that needs an open function was made outside one.
    #[error("no function is being built")]
    NoActiveFunction,

    /// `break`/`continue` outside of a loop.
    #[error("'{statement}' outside of a loop")]
    NotInLoop { statement: &'static str },

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl BuildError {
    pub fn skipped(reason: impl Into<String>) -> Self {
        BuildError::Skipped {
            reason: reason.into(),
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, BuildError::Skipped { .. })
    }
}
