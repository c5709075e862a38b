//! Core error types for ssaflow-core.
//!
//! [`CoreError`] covers API misuse and lookup failures in the graph model.
//! Source-level problems found while building are not errors: they are
//! recorded as [`SsaDiagnostic`](crate::diagnostic::SsaDiagnostic)s on the
//! program.

use crate::id::{BlockId, FunctionId, ValueId};
use thiserror::Error;

/// Errors produced by the ssaflow-core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No arena entry exists for the id.
    #[error("value not found: {id}")]
    ValueNotFound { id: ValueId },

    /// The id exists but is not a basic block.
    #[error("not a basic block: {id}")]
    NotABlock { id: BlockId },

    /// The id exists but is not a function.
    #[error("not a function: {id}")]
    NotAFunction { id: FunctionId },

    /// A package name was not registered in the program.
    #[error("package not found: '{name}'")]
    PackageNotFound { name: String },

    /// A lazy placeholder could not be materialized from its backing store.
    #[error("failed to load {id} from storage: {reason}")]
    LazyLoad { id: ValueId, reason: String },

    /// An edit would break a graph invariant.
    #[error("graph inconsistency: {reason}")]
    GraphInconsistency { reason: String },
}
