//! Storage error types for ssaflow-storage.

use ssaflow_core::{CoreError, ValueId};
use thiserror::Error;

/// Errors produced by storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Schema migration could not be applied.
    #[error("migration error: {0}")]
    Migration(String),

    /// No snapshot is stored under the program name.
    #[error("program not found: '{0}'")]
    ProgramNotFound(String),

    /// The program exists but has no node with this id.
    #[error("node not found: program='{program}', node={id}")]
    NodeNotFound { program: String, id: ValueId },

    /// Stored data contradicts itself, e.g. a node row under the wrong id.
    #[error("integrity error: {reason}")]
    IntegrityError { reason: String },

    /// The program could not be read while taking a snapshot.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl StorageError {
    /// Converts a failure to load `id` into the error a lazy program reports.
    pub fn into_lazy_load(self, id: ValueId) -> CoreError {
        CoreError::LazyLoad {
            id,
            reason: self.to_string(),
        }
    }
}
