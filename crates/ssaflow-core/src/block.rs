//! Basic blocks.
//!
//! A [`BasicBlock`] is the payload of an `InstKind::Block` arena entry. It
//! holds the ordered instruction list, the phi list, control edges and the
//! per-block construction state. Edges are only ever added by emitting a
//! terminator (see `Program::emit_jump` and friends), so a fresh block always
//! starts with empty `preds`/`succs`.

use serde::{Deserialize, Serialize};

use crate::id::{BlockId, ValueId};

/// Tri-state reachability. Advisory metadata; nothing in the core refuses
/// to traverse an `Unreachable` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Reachability {
    #[default]
    Unknown,
    Reachable,
    Unreachable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicBlock {
    /// Position of this block in its function's block list.
    pub index: usize,
    pub preds: Vec<BlockId>,
    pub succs: Vec<BlockId>,
    /// Value that must hold for control to reach this block, if known.
    pub condition: Option<ValueId>,
    pub reachability: Reachability,
    /// `ErrorHandler` instruction guarding this block.
    pub handler: Option<ValueId>,
    pub(crate) insts: Vec<ValueId>,
    pub(crate) phis: Vec<ValueId>,
    /// Once set, no predecessor may be added and phi edge counts are final.
    pub(crate) finished: bool,
}

impl BasicBlock {
    pub fn new(index: usize) -> Self {
        BasicBlock {
            index,
            preds: Vec::new(),
            succs: Vec::new(),
            condition: None,
            reachability: Reachability::Unknown,
            handler: None,
            insts: Vec::new(),
            phis: Vec::new(),
            finished: false,
        }
    }

    /// Instructions in program order, excluding phis.
    pub fn insts(&self) -> &[ValueId] {
        &self.insts
    }

    pub fn phis(&self) -> &[ValueId] {
        &self.phis
    }

    pub fn last_inst(&self) -> Option<ValueId> {
        self.insts.last().copied()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn pred_index(&self, pred: BlockId) -> Option<usize> {
        self.preds.iter().position(|p| *p == pred)
    }
}
