//! Query error types.
//!
//! Query traversals treat a missing or unloadable node as "not found" and
//! log it. Only bound violations and malformed inputs reach the caller.

use ssaflow_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    /// A nested result or a trace went deeper than its bound.
    #[error("recursion limit exceeded: depth {depth} > {limit}")]
    RecursionLimit { depth: usize, limit: usize },

    /// The operation cannot consume this kind of result.
    #[error("unsupported result shape: {shape}")]
    UnsupportedShape { shape: &'static str },

    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A handle names a program the query was not given.
    #[error("program not found: '{name}'")]
    ProgramNotFound { name: String },

    #[error(transparent)]
    Core(#[from] CoreError),
}
