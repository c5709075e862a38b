//! Program: the arena-backed container for one compiled project.
//!
//! [`Program`] is the single entry point for constructing and querying the
//! SSA graph. Every instruction, block and function lives in one arena keyed
//! by [`ValueId`]; edges are ids resolved through the arena, so the cyclic
//! value/user and function/closure relations need no shared ownership.
//!
//! All structural mutations go through `Program` methods so the use-def and
//! control-flow edge tables stay in sync. Read-only accessors return borrowed
//! instructions; reading a lazy placeholder materializes it through the
//! program's [`NodeLoader`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::block::BasicBlock;
use crate::diagnostic::{ErrorKind, ErrorTag, SsaDiagnostic};
use crate::editor::{Range, SourceEditor};
use crate::error::CoreError;
use crate::function::Function;
use crate::id::{BlockId, FunctionId, ValueId};
use crate::inst::{InstKind, Instruction, ParameterMemberInner, UndefinedKind};
use crate::lazy::{NodeLoader, Slot};
use crate::package::Package;
use crate::types::ConstValue;

/// Entry of the sorted offset index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetEntry {
    pub variable: String,
    pub value: ValueId,
}

/// Everything about a program except its nodes. Used by storage to persist
/// and rebuild programs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramParts {
    pub name: String,
    pub packages: Vec<Package>,
    pub entry: Option<FunctionId>,
    pub include_files: IndexMap<String, String>,
    pub offsets: Vec<(usize, OffsetEntry)>,
    pub errors: Vec<SsaDiagnostic>,
    pub next_id: u32,
}

pub struct Program {
    name: String,
    slots: Vec<Option<Slot>>,
    packages: IndexMap<String, Package>,
    entry: Option<FunctionId>,
    /// Active source editors, innermost last.
    editors: Vec<SourceEditor>,
    /// url -> content hash of every source compiled as an include.
    include_files: IndexMap<String, String>,
    offsets: BTreeMap<usize, OffsetEntry>,
    errors: Vec<SsaDiagnostic>,
    loader: Option<Arc<dyn NodeLoader>>,
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("name", &self.name)
            .field("nodes", &self.len())
            .field("packages", &self.packages.keys().collect::<Vec<_>>())
            .field("errors", &self.errors.len())
            .field("lazy", &self.loader.is_some())
            .finish()
    }
}

impl Program {
    pub fn new(name: impl Into<String>) -> Self {
        Program {
            name: name.into(),
            slots: Vec::new(),
            packages: IndexMap::new(),
            entry: None,
            editors: Vec::new(),
            include_files: IndexMap::new(),
            offsets: BTreeMap::new(),
            errors: Vec::new(),
            loader: None,
        }
    }

    /// Reconstructs a fully materialized program from stored parts.
    pub fn from_parts(parts: ProgramParts, nodes: Vec<Instruction>) -> Self {
        let mut program = Self::shell(parts, None);
        for node in nodes {
            let idx = node.id.0 as usize;
            if idx >= program.slots.len() {
                program.slots.resize_with(idx + 1, || None);
            }
            program.slots[idx] = Some(Slot::Materialized(node));
        }
        program
    }

    /// Reconstructs a program whose nodes are all placeholders. Each node is
    /// loaded from `loader` on first access.
    pub fn lazy(parts: ProgramParts, ids: &[ValueId], loader: Arc<dyn NodeLoader>) -> Self {
        let mut program = Self::shell(parts, Some(loader));
        for id in ids {
            let idx = id.0 as usize;
            if idx >= program.slots.len() {
                program.slots.resize_with(idx + 1, || None);
            }
            program.slots[idx] = Some(Slot::placeholder());
        }
        program
    }

    fn shell(parts: ProgramParts, loader: Option<Arc<dyn NodeLoader>>) -> Self {
        let mut slots = Vec::new();
        slots.resize_with(parts.next_id as usize, || None);
        Program {
            name: parts.name,
            slots,
            packages: parts
                .packages
                .into_iter()
                .map(|p| (p.name.clone(), p))
                .collect(),
            entry: parts.entry,
            editors: Vec::new(),
            include_files: parts.include_files,
            offsets: parts.offsets.into_iter().collect(),
            errors: parts.errors,
            loader,
        }
    }

    /// Splits off everything but the nodes.
    pub fn parts(&self) -> ProgramParts {
        ProgramParts {
            name: self.name.clone(),
            packages: self.packages.values().cloned().collect(),
            entry: self.entry,
            include_files: self.include_files.clone(),
            offsets: self
                .offsets
                .iter()
                .map(|(o, e)| (*o, e.clone()))
                .collect(),
            errors: self.errors.clone(),
            next_id: self.slots.len() as u32,
        }
    }

    /// Every live node, materializing placeholders on the way.
    pub fn nodes(&self) -> Result<Vec<Instruction>, CoreError> {
        self.ids().map(|id| self.get(id).cloned()).collect()
    }

    // -----------------------------------------------------------------------
    // Read-only accessors
    // -----------------------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of live arena entries.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: ValueId) -> bool {
        matches!(self.slots.get(id.0 as usize), Some(Some(_)))
    }

    /// `true` if the slot holds a placeholder that has not been loaded yet.
    pub fn is_pending(&self, id: ValueId) -> bool {
        matches!(self.slots.get(id.0 as usize), Some(Some(slot)) if slot.is_pending())
    }

    /// Live ids in allocation order.
    pub fn ids(&self) -> impl Iterator<Item = ValueId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some())
            .map(|(i, _)| ValueId(i as u32))
    }

    pub fn get(&self, id: ValueId) -> Result<&Instruction, CoreError> {
        match self.slots.get(id.0 as usize) {
            Some(Some(slot)) => slot.resolve(&self.name, id, self.loader.as_deref()),
            _ => Err(CoreError::ValueNotFound { id }),
        }
    }

    /// Like [`get`](Self::get) but for traversals that treat a missing or
    /// unloadable node as "not found".
    pub fn lookup(&self, id: ValueId) -> Option<&Instruction> {
        match self.get(id) {
            Ok(inst) => Some(inst),
            Err(err) => {
                tracing::warn!(program = %self.name, %id, error = %err, "lookup failed");
                None
            }
        }
    }

    pub fn get_mut(&mut self, id: ValueId) -> Result<&mut Instruction, CoreError> {
        let loader = self.loader.clone();
        match self.slots.get_mut(id.0 as usize) {
            Some(Some(slot)) => slot.resolve_mut(&self.name, id, loader.as_deref()),
            _ => Err(CoreError::ValueNotFound { id }),
        }
    }

    pub fn block(&self, id: BlockId) -> Result<&BasicBlock, CoreError> {
        match &self.get(id.into())?.kind {
            InstKind::Block(b) => Ok(b),
            _ => Err(CoreError::NotABlock { id }),
        }
    }

    pub fn block_mut(&mut self, id: BlockId) -> Result<&mut BasicBlock, CoreError> {
        match &mut self.get_mut(id.into())?.kind {
            InstKind::Block(b) => Ok(b),
            _ => Err(CoreError::NotABlock { id }),
        }
    }

    pub fn function(&self, id: FunctionId) -> Result<&Function, CoreError> {
        match &self.get(id.into())?.kind {
            InstKind::Function(f) => Ok(f),
            _ => Err(CoreError::NotAFunction { id }),
        }
    }

    pub fn function_mut(&mut self, id: FunctionId) -> Result<&mut Function, CoreError> {
        match &mut self.get_mut(id.into())?.kind {
            InstKind::Function(f) => Ok(f),
            _ => Err(CoreError::NotAFunction { id }),
        }
    }

    /// Function owning a block.
    pub fn block_function(&self, id: BlockId) -> Result<FunctionId, CoreError> {
        self.get(id.into())?
            .function
            .ok_or_else(|| CoreError::GraphInconsistency {
                reason: format!("{} has no owning function", id),
            })
    }

    /// Every function id in the arena, closures included.
    pub fn functions(&self) -> Vec<FunctionId> {
        self.ids()
            .filter(|id| {
                self.lookup(*id)
                    .is_some_and(|i| matches!(i.kind, InstKind::Function(_)))
            })
            .map(ValueId::as_function)
            .collect()
    }

    // -----------------------------------------------------------------------
    // Packages
    // -----------------------------------------------------------------------

    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        self.packages.values()
    }

    pub fn package(&self, name: &str) -> Result<&Package, CoreError> {
        self.packages
            .get(name)
            .ok_or_else(|| CoreError::PackageNotFound {
                name: name.to_string(),
            })
    }

    /// Returns the package, creating it on first use.
    pub fn package_mut(&mut self, name: &str) -> &mut Package {
        self.packages
            .entry(name.to_string())
            .or_insert_with(|| Package::new(name))
    }

    /// Looks up a named top-level function.
    pub fn get_function(&self, package: &str, name: &str) -> Option<FunctionId> {
        self.packages.get(package)?.function(name)
    }

    pub fn entry(&self) -> Option<FunctionId> {
        self.entry
    }

    pub fn set_entry(&mut self, func: FunctionId) {
        self.entry = Some(func);
    }

    // -----------------------------------------------------------------------
    // Editors, includes, offsets, diagnostics
    // -----------------------------------------------------------------------

    /// Makes `editor` the active source. Pair every push with a pop.
    pub fn push_editor(&mut self, editor: SourceEditor) {
        tracing::debug!(program = %self.name, url = editor.url(), depth = self.editors.len() + 1, "push editor");
        self.editors.push(editor);
    }

    /// Restores the previously active source.
    pub fn pop_editor(&mut self) -> Option<SourceEditor> {
        let editor = self.editors.pop();
        if editor.is_none() {
            tracing::warn!(program = %self.name, "pop_editor on empty editor stack");
        }
        editor
    }

    pub fn current_editor(&self) -> Option<&SourceEditor> {
        self.editors.last()
    }

    pub fn current_editor_mut(&mut self) -> Option<&mut SourceEditor> {
        self.editors.last_mut()
    }

    pub fn editor_depth(&self) -> usize {
        self.editors.len()
    }

    /// Range in the active editor, if any.
    pub fn range(&self, start: usize, end: usize) -> Option<Range> {
        self.current_editor().map(|e| e.range(start, end))
    }

    pub fn add_include_file(&mut self, url: impl Into<String>, hash: impl Into<String>) {
        self.include_files.insert(url.into(), hash.into());
    }

    pub fn include_files(&self) -> &IndexMap<String, String> {
        &self.include_files
    }

    pub fn set_offset(&mut self, offset: usize, variable: impl Into<String>, value: ValueId) {
        self.offsets.insert(
            offset,
            OffsetEntry {
                variable: variable.into(),
                value,
            },
        );
    }

    /// Entry with the greatest offset not after `offset`.
    pub fn value_at_offset(&self, offset: usize) -> Option<&OffsetEntry> {
        self.offsets.range(..=offset).next_back().map(|(_, e)| e)
    }

    pub fn errors(&self) -> &[SsaDiagnostic] {
        &self.errors
    }

    pub fn add_error(
        &mut self,
        kind: ErrorKind,
        tag: ErrorTag,
        message: impl Into<String>,
        range: Option<Range>,
    ) {
        let diag = SsaDiagnostic {
            kind,
            tag,
            message: message.into(),
            range,
        };
        tracing::debug!(program = %self.name, %diag, "diagnostic");
        self.errors.push(diag);
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    fn alloc(&mut self, kind: InstKind) -> ValueId {
        let id = ValueId(self.slots.len() as u32);
        self.slots
            .push(Some(Slot::Materialized(Instruction::new(id, kind))));
        id
    }

    /// Adds a function and its entry block.
    ///
    /// Top-level functions (no `parent`) are registered by name in
    /// `package`; closures are appended to the parent's `child_funcs`.
    pub fn new_function(
        &mut self,
        package: &str,
        name: &str,
        parent: Option<FunctionId>,
    ) -> Result<FunctionId, CoreError> {
        if let Some(parent) = parent {
            self.function(parent)?;
        }
        let id = self
            .alloc(InstKind::Function(Box::new(Function::new(package, parent))))
            .as_function();
        let range = self.current_range();
        {
            let inst = self.get_mut(id.into())?;
            inst.name = name.to_string();
            inst.function = parent;
            inst.range = range;
        }
        match parent {
            Some(parent) => self.function_mut(parent)?.child_funcs.push(id),
            None => {
                self.package_mut(package).add_function(name, id);
            }
        }
        let entry = self.new_block(id, "entry")?;
        self.function_mut(id)?.enter_block = Some(entry);
        Ok(id)
    }

    /// Appends an empty block to `func`.
    pub fn new_block(&mut self, func: FunctionId, name: &str) -> Result<BlockId, CoreError> {
        let index = self.function(func)?.blocks.len();
        let id = self
            .alloc(InstKind::Block(Box::new(BasicBlock::new(index))))
            .as_block();
        let inst = self.get_mut(id.into())?;
        inst.name = format!("{}-{}", name, index);
        inst.function = Some(func);
        inst.block = Some(id);
        self.function_mut(func)?.blocks.push(id);
        Ok(id)
    }

    /// Declares the next positional formal of `func`.
    pub fn new_parameter(&mut self, func: FunctionId, name: &str) -> Result<ValueId, CoreError> {
        let index = self.function(func)?.params.len();
        let id = self.new_detached(
            func,
            name,
            InstKind::Parameter {
                index,
                is_free_value: false,
                default: None,
                by_ref: false,
            },
        )?;
        self.function_mut(func)?.params.push(id);
        Ok(id)
    }

    /// Declares a captured name of closure `func`.
    pub fn new_free_value(&mut self, func: FunctionId, name: &str) -> Result<ValueId, CoreError> {
        let index = self.function(func)?.free_values.len();
        let id = self.new_detached(
            func,
            name,
            InstKind::Parameter {
                index,
                is_free_value: true,
                default: None,
                by_ref: false,
            },
        )?;
        self.function_mut(func)?
            .free_values
            .insert(name.to_string(), id);
        Ok(id)
    }

    pub fn new_parameter_member(
        &mut self,
        func: FunctionId,
        name: &str,
        member: ParameterMemberInner,
    ) -> Result<ValueId, CoreError> {
        let index = self.function(func)?.parameter_members.len();
        let id = self.new_detached(func, name, InstKind::ParameterMember { index, member })?;
        self.function_mut(func)?.parameter_members.push(id);
        Ok(id)
    }

    /// Constants are owned by a function but not listed in any block.
    pub fn new_const(
        &mut self,
        func: Option<FunctionId>,
        value: impl Into<ConstValue>,
    ) -> ValueId {
        let value = value.into();
        let ty = value.ty();
        let range = self.current_range();
        let id = self.alloc(InstKind::Const { value });
        if let Ok(inst) = self.get_mut(id) {
            inst.function = func;
            inst.ty = Some(ty);
            inst.range = range;
        }
        id
    }

    pub fn new_undefined(
        &mut self,
        func: FunctionId,
        name: &str,
        kind: UndefinedKind,
    ) -> Result<ValueId, CoreError> {
        self.new_detached(func, name, InstKind::Undefined { kind })
    }

    /// A value owned by `func` that lives outside every block.
    fn new_detached(
        &mut self,
        func: FunctionId,
        name: &str,
        kind: InstKind,
    ) -> Result<ValueId, CoreError> {
        self.function(func)?;
        let range = self.current_range();
        let id = self.alloc(kind);
        let inst = self.get_mut(id)?;
        inst.name = name.to_string();
        inst.function = Some(func);
        inst.range = range;
        Ok(id)
    }

    /// Appends an instruction to `block`, wiring use-def edges for every
    /// operand and control edges for terminators.
    ///
    /// Emitting into a block that already ends in a terminator is refused.
    pub fn emit(&mut self, block: BlockId, kind: InstKind) -> Result<ValueId, CoreError> {
        if let Some(last) = self.block(block)?.last_inst() {
            if self.get(last)?.kind.is_terminator() {
                return Err(CoreError::GraphInconsistency {
                    reason: format!("{} already has a terminator", block),
                });
            }
        }
        for target in kind.block_targets() {
            if self.block(target)?.is_finished() {
                return Err(CoreError::GraphInconsistency {
                    reason: format!("{} is finished; cannot add predecessor {}", target, block),
                });
            }
        }

        let func = self.block_function(block)?;
        let operands = kind.operands();
        let targets = kind.block_targets();
        let is_return = matches!(kind, InstKind::Return { .. });
        let range = self.current_range();

        let id = self.alloc(kind);
        {
            let inst = self.get_mut(id)?;
            inst.function = Some(func);
            inst.block = Some(block);
            inst.range = range;
        }
        for op in operands {
            self.add_user(op, id)?;
        }
        for target in targets {
            self.block_mut(block)?.succs.push(target);
            self.block_mut(target)?.preds.push(block);
        }
        self.block_mut(block)?.insts.push(id);
        if is_return {
            self.function_mut(func)?.returns.push(id);
        }
        Ok(id)
    }

    /// Creates an empty phi at the head of `block`.
    pub fn new_phi(&mut self, block: BlockId, name: &str) -> Result<ValueId, CoreError> {
        let func = self.block_function(block)?;
        let id = self.alloc(InstKind::Phi { edges: Vec::new() });
        {
            let inst = self.get_mut(id)?;
            inst.name = name.to_string();
            inst.function = Some(func);
            inst.block = Some(block);
        }
        self.block_mut(block)?.phis.push(id);
        Ok(id)
    }

    /// Replaces a phi's incoming edges, keeping users in sync.
    pub fn set_phi_edges(&mut self, phi: ValueId, edges: Vec<ValueId>) -> Result<(), CoreError> {
        let old = match &self.get(phi)?.kind {
            InstKind::Phi { edges, .. } => edges.clone(),
            other => {
                return Err(CoreError::GraphInconsistency {
                    reason: format!("{} is {:?}, not a phi", phi, other.opcode()),
                })
            }
        };
        for v in &edges {
            self.get(*v)?;
        }
        // The payload changes first so that `remove_user` sees only the new
        // operands.
        if let InstKind::Phi { edges: slot, .. } = &mut self.get_mut(phi)?.kind {
            *slot = edges.clone();
        }
        for v in &old {
            self.remove_user(*v, phi)?;
        }
        for v in &edges {
            self.add_user(*v, phi)?;
        }
        Ok(())
    }

    /// Seals a block: no predecessor may be added afterwards. A phi whose
    /// edge count disagrees with the predecessor count is reported as a
    /// consistency warning.
    pub fn finish_block(&mut self, block: BlockId) -> Result<(), CoreError> {
        let (preds, phis) = {
            let b = self.block(block)?;
            (b.preds.len(), b.phis.clone())
        };
        for phi in phis {
            if let InstKind::Phi { edges, .. } = &self.get(phi)?.kind {
                if edges.len() != preds {
                    tracing::warn!(%block, %phi, edges = edges.len(), preds, "phi edge count mismatch");
                }
            }
        }
        self.block_mut(block)?.finished = true;
        Ok(())
    }

    /// Seals every block, computes reachability and freezes the function.
    pub fn finish_function(&mut self, func: FunctionId) -> Result<(), CoreError> {
        let blocks = self.function(func)?.blocks.clone();
        for block in blocks {
            if !self.block(block)?.is_finished() {
                self.finish_block(block)?;
            }
        }
        self.mark_reachability(func)?;
        self.function_mut(func)?.finished = true;
        Ok(())
    }

    fn current_range(&self) -> Option<Range> {
        self.current_editor().map(|e| e.range(0, 0))
    }

    /// Sets the source range of a node.
    pub fn set_range(&mut self, id: ValueId, range: Range) -> Result<(), CoreError> {
        self.get_mut(id)?.range = Some(range);
        Ok(())
    }

    pub(crate) fn clear_slot(&mut self, id: ValueId) {
        if let Some(slot) = self.slots.get_mut(id.0 as usize) {
            *slot = None;
        }
    }

    /// Checks that every operand edge has its inverse user edge and vice
    /// versa.
    pub fn verify_use_def(&self) -> Result<(), CoreError> {
        for id in self.ids() {
            let inst = self.get(id)?;
            for op in inst.operands() {
                if !self.get(op)?.users.contains(&id) {
                    return Err(CoreError::GraphInconsistency {
                        reason: format!("{} uses {} but is not in its users", id, op),
                    });
                }
            }
            for user in &inst.users {
                if !self.get(*user)?.operands().contains(&id) {
                    return Err(CoreError::GraphInconsistency {
                        reason: format!("{} lists user {} without an operand edge", id, user),
                    });
                }
            }
        }
        Ok(())
    }
}
