//! SyntaxFlow query VM over finished ssaflow programs.
//!
//! Queries start from a [`ValueOperator`]: some values, a nested list of
//! results, or whole programs. [`Query::search`] filters values by name or
//! member key, and [`Query::top_defs`] / [`Query::bottom_defs`] follow data
//! flow backwards and forwards across call boundaries.
//!
//! # Modules
//!
//! - [`operator`]: result shapes, flattening and the nesting bound
//! - [`matcher`]: exact, glob and regex predicates, search modes
//! - [`query`]: the query context and search
//! - [`trace`]: top-def and bottom-def tracing

pub mod error;
pub mod matcher;
pub mod operator;
pub mod query;
pub mod trace;

pub use error::QueryError;
pub use matcher::{Matcher, SearchMode};
pub use operator::{ValueHandle, ValueOperator, MAX_NESTING};
pub use query::Query;
pub use trace::TraceOptions;
