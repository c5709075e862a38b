//! Query results.
//!
//! A result is a single value, a flat collection, a nested list of results,
//! or a set of whole programs standing in for "every value they hold".
//! Consumers usually want a flat, de-duplicated list; [`ValueOperator::flatten`]
//! produces one and refuses structures nested deeper than [`MAX_NESTING`].

use std::fmt;
use std::ops::ControlFlow;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use ssaflow_core::ValueId;

use crate::error::QueryError;

/// Deepest list nesting a result may have.
pub const MAX_NESTING: usize = 1000;

/// A value in a named program.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueHandle {
    pub program: String,
    pub id: ValueId,
}

impl ValueHandle {
    pub fn new(program: impl Into<String>, id: ValueId) -> Self {
        ValueHandle {
            program: program.into(),
            id,
        }
    }
}

impl fmt::Display for ValueHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.program, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValueOperator {
    Value(ValueHandle),
    Values(Vec<ValueHandle>),
    List(Vec<ValueOperator>),
    /// Every live value of the named programs.
    Programs(Vec<String>),
}

impl Default for ValueOperator {
    fn default() -> Self {
        ValueOperator::Values(Vec::new())
    }
}

impl From<ValueHandle> for ValueOperator {
    fn from(handle: ValueHandle) -> Self {
        ValueOperator::Value(handle)
    }
}

impl From<Vec<ValueHandle>> for ValueOperator {
    fn from(handles: Vec<ValueHandle>) -> Self {
        ValueOperator::Values(handles)
    }
}

impl ValueOperator {
    pub fn shape(&self) -> &'static str {
        match self {
            ValueOperator::Value(_) => "value",
            ValueOperator::Values(_) => "values",
            ValueOperator::List(_) => "list",
            ValueOperator::Programs(_) => "programs",
        }
    }

    /// Visits every handle depth-first, in order, until `f` breaks.
    ///
    /// Fails on program sets, which only a query can enumerate, and on lists
    /// nested deeper than [`MAX_NESTING`].
    pub fn recursive<F>(&self, mut f: F) -> Result<(), QueryError>
    where
        F: FnMut(&ValueHandle) -> ControlFlow<()>,
    {
        self.visit(0, &mut f).map(|_| ())
    }

    fn visit<F>(&self, depth: usize, f: &mut F) -> Result<ControlFlow<()>, QueryError>
    where
        F: FnMut(&ValueHandle) -> ControlFlow<()>,
    {
        match self {
            ValueOperator::Value(handle) => Ok(f(handle)),
            ValueOperator::Values(handles) => {
                for handle in handles {
                    if f(handle).is_break() {
                        return Ok(ControlFlow::Break(()));
                    }
                }
                Ok(ControlFlow::Continue(()))
            }
            ValueOperator::List(items) => {
                let depth = depth + 1;
                if depth > MAX_NESTING {
                    return Err(QueryError::RecursionLimit {
                        depth,
                        limit: MAX_NESTING,
                    });
                }
                for item in items {
                    if item.visit(depth, f)?.is_break() {
                        return Ok(ControlFlow::Break(()));
                    }
                }
                Ok(ControlFlow::Continue(()))
            }
            ValueOperator::Programs(_) => Err(QueryError::UnsupportedShape {
                shape: self.shape(),
            }),
        }
    }

    /// Every handle once, in first-seen order.
    pub fn flatten(&self) -> Result<Vec<ValueHandle>, QueryError> {
        let mut seen = IndexSet::new();
        self.recursive(|handle| {
            if !seen.contains(handle) {
                seen.insert(handle.clone());
            }
            ControlFlow::Continue(())
        })?;
        Ok(seen.into_iter().collect())
    }
}
