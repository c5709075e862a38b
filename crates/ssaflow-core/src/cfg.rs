//! Control-flow views over a function's blocks.
//!
//! Structural queries used by downstream analyses: elif-chain recovery,
//! "meaningful" branch extraction behind a jump, the block graph as a
//! petgraph `StableGraph`, and reachability marking.

use std::collections::{HashMap, HashSet};

use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableGraph;
use petgraph::visit::Dfs;
use petgraph::Directed;

use crate::block::Reachability;
use crate::error::CoreError;
use crate::id::{BlockId, FunctionId, ValueId};
use crate::inst::InstKind;
use crate::program::Program;

/// Block-level control-flow graph of one function.
pub type CfgGraph = StableGraph<BlockId, (), Directed, u32>;

impl Program {
    /// Recovers the `else if` chain hanging off an `If`.
    ///
    /// Follows each `false_block` whose last instruction is another `If`
    /// and returns those Ifs in source order, excluding `if_inst` itself.
    /// A chain that loops back to an already visited `If` stops there.
    pub fn if_siblings(&self, if_inst: ValueId) -> Vec<ValueId> {
        let mut visited = HashSet::new();
        let mut out = Vec::new();
        self.collect_siblings(if_inst, &mut visited, &mut out);
        out
    }

    fn collect_siblings(&self, current: ValueId, visited: &mut HashSet<ValueId>, out: &mut Vec<ValueId>) {
        if !visited.insert(current) {
            return;
        }
        let Some(inst) = self.lookup(current) else {
            return;
        };
        let InstKind::If {
            false_block: Some(false_block),
            ..
        } = inst.kind
        else {
            return;
        };
        let Ok(block) = self.block(false_block) else {
            return;
        };
        let Some(last) = block.last_inst() else {
            return;
        };
        let is_if = self
            .lookup(last)
            .is_some_and(|i| matches!(i.kind, InstKind::If { .. }));
        if is_if && !visited.contains(&last) {
            out.push(last);
            self.collect_siblings(last, visited, out);
        }
    }

    /// Branching decision behind a block that ends in a `Jump`.
    ///
    /// If the jump target ends in an `If`, returns that `If` and its
    /// siblings; for a `Switch`, the label values; for a `Loop`, its
    /// condition. Returns `None` for blocks that are not structure entries.
    pub fn cfg_entry_instructions(&self, block: BlockId) -> Option<Vec<ValueId>> {
        let last = self.block(block).ok()?.last_inst()?;
        let to = match self.lookup(last)?.kind {
            InstKind::Jump { to } => to,
            _ => return None,
        };
        let target = match self.block(to) {
            Ok(b) => b,
            Err(err) => {
                tracing::warn!(%block, %to, error = %err, "jump target is not a block");
                return None;
            }
        };
        let last = target.last_inst()?;
        match &self.lookup(last)?.kind {
            InstKind::If { .. } => {
                let mut ifs = vec![last];
                ifs.extend(self.if_siblings(last));
                Some(ifs)
            }
            InstKind::Switch { labels, .. } => Some(labels.iter().map(|l| l.value).collect()),
            InstKind::Loop { cond, .. } => cond.map(|c| vec![c]),
            other => {
                tracing::warn!(%block, %to, opcode = ?other.opcode(), "unsupported cfg entry terminator");
                None
            }
        }
    }

    /// The function's blocks as a petgraph graph, with one edge per
    /// successor link.
    pub fn cfg_graph(&self, func: FunctionId) -> Result<(CfgGraph, HashMap<BlockId, NodeIndex<u32>>), CoreError> {
        let blocks = &self.function(func)?.blocks;
        let mut graph = CfgGraph::default();
        let mut index = HashMap::with_capacity(blocks.len());
        for block in blocks {
            index.insert(*block, graph.add_node(*block));
        }
        for block in blocks {
            for succ in &self.block(*block)?.succs {
                match index.get(succ) {
                    Some(to) => {
                        graph.add_edge(index[block], *to, ());
                    }
                    None => tracing::warn!(%func, %block, %succ, "successor outside function"),
                }
            }
        }
        Ok((graph, index))
    }

    /// Marks blocks reachable from the entry `Reachable` and the rest
    /// `Unreachable`. Blocks already marked `Unreachable` by construction
    /// stay that way.
    pub fn mark_reachability(&mut self, func: FunctionId) -> Result<(), CoreError> {
        let Some(entry) = self.function(func)?.enter_block else {
            return Ok(());
        };
        let (graph, index) = self.cfg_graph(func)?;
        let Some(start) = index.get(&entry).copied() else {
            return Ok(());
        };
        let mut reached = HashSet::new();
        let mut dfs = Dfs::new(&graph, start);
        while let Some(node) = dfs.next(&graph) {
            reached.insert(graph[node]);
        }
        for block in index.keys() {
            let b = self.block_mut(*block)?;
            b.reachability = match (reached.contains(block), b.reachability) {
                (_, Reachability::Unreachable) => Reachability::Unreachable,
                (true, _) => Reachability::Reachable,
                (false, _) => Reachability::Unreachable,
            };
        }
        Ok(())
    }

    /// Instructions of the entry block, phis first.
    pub fn first_block_instructions(&self, func: FunctionId) -> Result<Vec<ValueId>, CoreError> {
        let entry = self
            .function(func)?
            .enter_block
            .ok_or_else(|| CoreError::GraphInconsistency {
                reason: format!("{} has no entry block", func),
            })?;
        let block = self.block(entry)?;
        Ok(block.phis().iter().chain(block.insts()).copied().collect())
    }
}
