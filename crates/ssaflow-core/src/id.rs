//! Stable ID newtypes for graph entities.
//!
//! Every instruction, block and function lives in one program-scoped arena and
//! draws its id from the same monotonic counter, so a [`BlockId`] or
//! [`FunctionId`] is always also a valid [`ValueId`]. The distinct newtypes
//! keep a block from being passed where an arbitrary value is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of any arena entry (instruction, value, block or function).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueId(pub u32);

/// Identity of a basic block. Shares the id space of [`ValueId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u32);

/// Identity of a function. Shares the id space of [`ValueId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

// Blocks and functions are values too.

impl From<BlockId> for ValueId {
    fn from(id: BlockId) -> Self {
        ValueId(id.0)
    }
}

impl From<FunctionId> for ValueId {
    fn from(id: FunctionId) -> Self {
        ValueId(id.0)
    }
}

impl ValueId {
    /// Reinterprets this id as a block id. The caller is responsible for
    /// checking the arena entry really is a block.
    pub fn as_block(self) -> BlockId {
        BlockId(self.0)
    }

    /// Reinterprets this id as a function id.
    pub fn as_function(self) -> FunctionId {
        FunctionId(self.0)
    }
}
