//! Variable resolution and phi placement.
//!
//! Each function under construction owns a [`Frame`] holding one definition
//! table per block. Reads walk predecessors the way Braun et al. describe
//! ("Simple and Efficient Construction of SSA Form"): a read in an unsealed
//! block leaves an incomplete phi that is filled when the block is sealed; a
//! read in a sealed block with several predecessors places a phi at once;
//! phis whose edges all agree are removed again.
//!
//! A read that reaches the entry block of a closure without a definition is
//! resolved in the enclosing frame at the point the closure was opened, and
//! becomes a free-value parameter of the closure.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use ssaflow_core::{BlockId, FunctionId, InstKind, UndefinedKind, ValueId};

use crate::builder::Builder;
use crate::error::BuildError;

/// One step of the predecessor walk in [`Builder::read_in`].
#[derive(Debug, Clone, Copy)]
enum Resolve {
    Read(BlockId),
    /// Defines the name in a single-predecessor block with the value just
    /// read from its predecessor.
    Record(BlockId),
    /// Fills `phi` from the last `operands` results.
    Complete {
        phi: ValueId,
        block: BlockId,
        operands: usize,
        record: bool,
    },
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct LoopTargets {
    /// `None` inside a switch that no loop encloses.
    pub(crate) continue_to: Option<BlockId>,
    pub(crate) break_to: BlockId,
}

/// Construction state of one function.
#[derive(Debug)]
pub(crate) struct Frame {
    pub(crate) func: FunctionId,
    pub(crate) current: BlockId,
    /// Block of the enclosing frame that was current when this closure was
    /// opened.
    pub(crate) parent_block: Option<BlockId>,
    defs: HashMap<BlockId, IndexMap<String, ValueId>>,
    sealed: HashSet<BlockId>,
    incomplete: HashMap<BlockId, Vec<(String, ValueId)>>,
    /// Names declared or assigned by this function itself.
    pub(crate) locals: HashSet<String>,
    undefined: HashMap<String, ValueId>,
    pub(crate) loops: Vec<LoopTargets>,
}

impl Frame {
    pub(crate) fn new(func: FunctionId, entry: BlockId, parent_block: Option<BlockId>) -> Self {
        let mut sealed = HashSet::new();
        sealed.insert(entry);
        Frame {
            func,
            current: entry,
            parent_block,
            defs: HashMap::new(),
            sealed,
            incomplete: HashMap::new(),
            locals: HashSet::new(),
            undefined: HashMap::new(),
            loops: Vec::new(),
        }
    }

    pub(crate) fn is_sealed(&self, block: BlockId) -> bool {
        self.sealed.contains(&block)
    }

    pub(crate) fn unsealed(&self) -> Vec<BlockId> {
        let mut blocks: Vec<BlockId> = self
            .defs
            .keys()
            .chain(self.incomplete.keys())
            .filter(|b| !self.sealed.contains(b))
            .copied()
            .collect();
        blocks.sort();
        blocks.dedup();
        blocks
    }
}

impl<'a> Builder<'a> {
    pub(crate) fn write_in(&mut self, fi: usize, name: &str, block: BlockId, value: ValueId) {
        self.frames[fi]
            .defs
            .entry(block)
            .or_default()
            .insert(name.to_string(), value);
    }

    /// Resolves `name` as seen at the end of `block` in frame `fi`.
    /// Returns `None` when no definition reaches the block.
    pub(crate) fn read_in(
        &mut self,
        fi: usize,
        name: &str,
        block: BlockId,
    ) -> Result<Option<ValueId>, BuildError> {
        if let Some(v) = self.frames[fi].defs.get(&block).and_then(|m| m.get(name)) {
            return Ok(Some(*v));
        }
        self.resolve(fi, name, vec![Resolve::Read(block)])
    }

    /// Runs the predecessor walk on an explicit stack so that long chains of
    /// merges cannot exhaust the thread stack. Each finished task leaves its
    /// result on `values`; a phi pops one result per predecessor.
    fn resolve(
        &mut self,
        fi: usize,
        name: &str,
        mut tasks: Vec<Resolve>,
    ) -> Result<Option<ValueId>, BuildError> {
        let mut values: Vec<Option<ValueId>> = Vec::new();
        while let Some(task) = tasks.pop() {
            match task {
                Resolve::Read(block) => {
                    if let Some(v) = self.frames[fi].defs.get(&block).and_then(|m| m.get(name)) {
                        values.push(Some(*v));
                        continue;
                    }
                    let preds = self.program.block(block)?.preds.clone();
                    if !self.frames[fi].is_sealed(block) {
                        let phi = self.program.new_phi(block, name)?;
                        self.frames[fi]
                            .incomplete
                            .entry(block)
                            .or_default()
                            .push((name.to_string(), phi));
                        self.write_in(fi, name, block, phi);
                        values.push(Some(phi));
                    } else if preds.is_empty() {
                        let func = self.frames[fi].func;
                        let value = if self.program.function(func)?.enter_block == Some(block) {
                            self.resolve_free_value(fi, name)?
                        } else {
                            None
                        };
                        if let Some(v) = value {
                            self.write_in(fi, name, block, v);
                        }
                        values.push(value);
                    } else if preds.len() == 1 {
                        tasks.push(Resolve::Record(block));
                        tasks.push(Resolve::Read(preds[0]));
                    } else {
                        // Break cycles: record the phi before visiting predecessors.
                        let phi = self.program.new_phi(block, name)?;
                        self.write_in(fi, name, block, phi);
                        tasks.push(Resolve::Complete {
                            phi,
                            block,
                            operands: preds.len(),
                            record: true,
                        });
                        tasks.extend(preds.iter().rev().map(|p| Resolve::Read(*p)));
                    }
                }
                Resolve::Record(block) => {
                    if let Some(Some(v)) = values.last().copied() {
                        self.write_in(fi, name, block, v);
                    }
                }
                Resolve::Complete {
                    phi,
                    block,
                    operands,
                    record,
                } => {
                    let split = values.len().saturating_sub(operands);
                    let mut edges = Vec::with_capacity(operands);
                    for v in values.split_off(split) {
                        edges.push(match v {
                            Some(v) => v,
                            None => self.undefined_for(fi, name)?,
                        });
                    }
                    self.program.set_phi_edges(phi, edges)?;
                    let v = self.try_remove_trivial_phi(fi, phi)?;
                    if record {
                        self.write_in(fi, name, block, v);
                    }
                    values.push(Some(v));
                }
            }
        }
        Ok(values.pop().flatten())
    }

    /// Looks `name` up without placing phis: the block itself, then single
    /// sealed predecessors.
    pub(crate) fn peek_in(&self, fi: usize, name: &str, mut block: BlockId) -> Option<ValueId> {
        loop {
            if let Some(v) = self.frames[fi].defs.get(&block).and_then(|m| m.get(name)) {
                return Some(*v);
            }
            if !self.frames[fi].is_sealed(block) {
                return None;
            }
            let preds = &self.program.block(block).ok()?.preds;
            if preds.len() != 1 {
                return None;
            }
            block = preds[0];
        }
    }

    /// `true` if `name` is not local to frame `fi` but some enclosing frame
    /// can see it.
    pub(crate) fn is_captured(&self, fi: usize, name: &str) -> bool {
        if fi == 0 || self.frames[fi].locals.contains(name) {
            return false;
        }
        let func = self.frames[fi].func;
        if self
            .program
            .function(func)
            .is_ok_and(|f| f.free_values.contains_key(name))
        {
            return true;
        }
        let parent = fi - 1;
        match self.frames[fi].parent_block {
            Some(block) => self.peek_in(parent, name, block).is_some() || self.is_captured(parent, name),
            None => false,
        }
    }

    pub(crate) fn resolve_free_value(&mut self, fi: usize, name: &str) -> Result<Option<ValueId>, BuildError> {
        if fi == 0 {
            return Ok(None);
        }
        let func = self.frames[fi].func;
        if let Some(fv) = self.program.function(func)?.free_values.get(name) {
            return Ok(Some(*fv));
        }
        let Some(parent_block) = self.frames[fi].parent_block else {
            return Ok(None);
        };
        match self.read_in(fi - 1, name, parent_block)? {
            Some(_) => {
                let fv = self.program.new_free_value(func, name)?;
                tracing::debug!(%func, name, %fv, "captured free value");
                Ok(Some(fv))
            }
            None => Ok(None),
        }
    }

    fn undefined_for(&mut self, fi: usize, name: &str) -> Result<ValueId, BuildError> {
        if let Some(v) = self.frames[fi].undefined.get(name) {
            if self.program.contains(*v) {
                return Ok(*v);
            }
        }
        let func = self.frames[fi].func;
        let v = self
            .program
            .new_undefined(func, name, UndefinedKind::ValueInvalid)?;
        self.frames[fi].undefined.insert(name.to_string(), v);
        Ok(v)
    }

    fn add_phi_operands(
        &mut self,
        fi: usize,
        name: &str,
        phi: ValueId,
        block: BlockId,
    ) -> Result<Option<ValueId>, BuildError> {
        let preds = self.program.block(block)?.preds.clone();
        let mut tasks = vec![Resolve::Complete {
            phi,
            block,
            operands: preds.len(),
            record: false,
        }];
        tasks.extend(preds.iter().rev().map(|p| Resolve::Read(*p)));
        self.resolve(fi, name, tasks)
    }

    /// Replaces a phi whose edges are all the same value (or itself) by that
    /// value, then retries every phi that used it. Returns whatever now
    /// stands for `phi`.
    fn try_remove_trivial_phi(&mut self, fi: usize, phi: ValueId) -> Result<ValueId, BuildError> {
        let (same, users) = self.remove_if_trivial(fi, phi)?;
        let mut work: Vec<ValueId> = users.into_iter().rev().collect();
        while let Some(candidate) = work.pop() {
            let (_, users) = self.remove_if_trivial(fi, candidate)?;
            work.extend(users.into_iter().rev());
        }
        Ok(same)
    }

    /// Removes `phi` if it is trivial. Returns its stand-in and the phis
    /// that used it, which may have become trivial in turn.
    fn remove_if_trivial(&mut self, fi: usize, phi: ValueId) -> Result<(ValueId, Vec<ValueId>), BuildError> {
        let (edges, name) = match self.program.get(phi) {
            Ok(inst) => match &inst.kind {
                InstKind::Phi { edges, .. } => (edges.clone(), inst.name.clone()),
                _ => return Ok((phi, Vec::new())),
            },
            Err(_) => return Ok((phi, Vec::new())),
        };
        let mut same = None;
        for op in edges {
            if Some(op) == same || op == phi {
                continue;
            }
            if same.is_some() {
                return Ok((phi, Vec::new()));
            }
            same = Some(op);
        }
        let same = match same {
            Some(v) => v,
            None => self.undefined_for(fi, &name)?,
        };

        let phi_users: Vec<ValueId> = self
            .program
            .get(phi)?
            .users()
            .iter()
            .copied()
            .filter(|u| *u != phi)
            .collect();
        self.program.replace_all_uses(phi, same)?;
        for table in self.frames[fi].defs.values_mut() {
            for v in table.values_mut() {
                if *v == phi {
                    *v = same;
                }
            }
        }
        self.program.self_delete(phi)?;

        let phis = phi_users
            .into_iter()
            .filter(|user| {
                self.program
                    .get(*user)
                    .is_ok_and(|u| matches!(u.kind, InstKind::Phi { .. }))
            })
            .collect();
        Ok((same, phis))
    }

    /// Declares that every predecessor of `block` is known. Incomplete phis
    /// of the block are filled and the block is finished in the program.
    pub(crate) fn seal_in(&mut self, fi: usize, block: BlockId) -> Result<(), BuildError> {
        if self.frames[fi].is_sealed(block) {
            return Ok(());
        }
        let pending = self.frames[fi].incomplete.remove(&block).unwrap_or_default();
        self.frames[fi].sealed.insert(block);
        for (name, phi) in pending {
            if self.program.contains(phi) {
                self.add_phi_operands(fi, &name, phi, block)?;
            }
        }
        self.program.finish_block(block)?;
        Ok(())
    }

    pub(crate) fn mark_sealed(&mut self, fi: usize, block: BlockId) {
        self.frames[fi].sealed.insert(block);
    }
}
