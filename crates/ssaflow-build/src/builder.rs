//! The builder protocol driven by language front-ends.
//!
//! A [`Builder`] wraps a `&mut Program` and a stack of function frames. The
//! front-end opens a function, declares parameters, emits instructions into
//! the current block, opens nested closures (which push a frame) and
//! finishes each function (which pops it). Variable reads and writes go
//! through the scope tables in `scope.rs`, so phis, free values and masks
//! are placed without the front-end having to know about them.

use ssaflow_core::{
    BinaryOp, BlockId, Call, ClassBlueprint, ConstValue, ErrorKind, ErrorTag, FunctionId,
    FunctionSideEffect, InstKind, MemberCallKind, ParameterMemberInner, Program, Range,
    Reachability, SourceCache, SourceEditor, SsaType, UnaryOp, UndefinedKind, ValueId,
};

use crate::error::BuildError;
use crate::frontend::LanguageFrontend;
use crate::fs::FileSystem;
use crate::scope::Frame;

/// What a builder needs to compile `include`d files in place.
#[derive(Clone, Copy)]
pub struct IncludeHook<'a> {
    pub fs: &'a dyn FileSystem,
    pub frontend: &'a dyn LanguageFrontend,
    pub ignore_syntax_errors: bool,
    /// Sources already compiled for this program. `None` when caching is off.
    pub cache: Option<&'a SourceCache>,
}

pub struct Builder<'a> {
    pub(crate) program: &'a mut Program,
    package: String,
    pub(crate) frames: Vec<Frame>,
    position: Option<Range>,
    include: Option<IncludeHook<'a>>,
    included: Vec<String>,
    include_cache_hits: Vec<(String, String)>,
}

impl<'a> Builder<'a> {
    pub fn new(program: &'a mut Program, package: impl Into<String>) -> Self {
        Builder {
            program,
            package: package.into(),
            frames: Vec::new(),
            position: None,
            include: None,
            included: Vec::new(),
            include_cache_hits: Vec::new(),
        }
    }

    pub fn with_include(mut self, hook: IncludeHook<'a>) -> Self {
        self.include = Some(hook);
        self
    }

    pub fn program(&self) -> &Program {
        self.program
    }

    pub fn program_mut(&mut self) -> &mut Program {
        self.program
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    /// Paths compiled through [`include_file`](Self::include_file).
    pub fn included_files(&self) -> &[String] {
        &self.included
    }

    /// `(path, source hash)` of included files the cache already knew.
    pub fn include_cache_hits(&self) -> &[(String, String)] {
        &self.include_cache_hits
    }

    // -----------------------------------------------------------------------
    // Frames
    // -----------------------------------------------------------------------

    fn top(&self) -> Result<usize, BuildError> {
        self.frames
            .len()
            .checked_sub(1)
            .ok_or(BuildError::NoActiveFunction)
    }

    pub fn current_function(&self) -> Result<FunctionId, BuildError> {
        Ok(self.frames[self.top()?].func)
    }

    pub fn current_block(&self) -> Result<BlockId, BuildError> {
        Ok(self.frames[self.top()?].current)
    }

    /// Nesting depth of the function being built (0 when none is open).
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Opens a function. Called while another function is open, the new
    /// function is a closure of it.
    pub fn start_function(&mut self, name: &str) -> Result<FunctionId, BuildError> {
        let parent = self.frames.last().map(|f| (f.func, f.current));
        let func = self
            .program
            .new_function(&self.package, name, parent.map(|(f, _)| f))?;
        let entry = self
            .program
            .function(func)?
            .enter_block
            .ok_or_else(|| BuildError::Frontend {
                file: self.current_url(),
                message: format!("function '{}' has no entry block", name),
            })?;
        self.program.finish_block(entry)?;
        if let Some(range) = self.position.clone() {
            self.program.set_range(func.into(), range)?;
        }
        self.frames
            .push(Frame::new(func, entry, parent.map(|(_, b)| b)));
        tracing::debug!(%func, name, depth = self.frames.len(), "start function");
        Ok(func)
    }

    /// Closes the innermost function: adds an implicit empty return, seals
    /// every block and marks reachability. Returns the function id.
    pub fn finish_function(&mut self) -> Result<FunctionId, BuildError> {
        let fi = self.top()?;
        if !self.is_terminated()? {
            self.emit(InstKind::Return { results: vec![] })?;
        }
        for block in self.frames[fi].unsealed() {
            self.seal_in(fi, block)?;
        }
        let func = self.frames[fi].func;
        self.program.finish_function(func)?;
        self.frames.pop();
        tracing::debug!(%func, "finish function");
        Ok(func)
    }

    pub fn set_variadic(&mut self, variadic: bool) -> Result<(), BuildError> {
        let func = self.current_function()?;
        self.program.function_mut(func)?.variadic = variadic;
        Ok(())
    }

    pub fn set_method(&mut self, method_name: &str) -> Result<(), BuildError> {
        let func = self.current_function()?;
        let f = self.program.function_mut(func)?;
        f.is_method = true;
        f.method_name = method_name.to_string();
        Ok(())
    }

    pub fn add_class(&mut self, class: ClassBlueprint) {
        let package = self.package.clone();
        self.program.package_mut(&package).add_class(class);
    }

    // -----------------------------------------------------------------------
    // Positions and diagnostics
    // -----------------------------------------------------------------------

    /// Sets the source span attached to everything emitted next.
    pub fn set_position(&mut self, start: usize, end: usize) {
        self.position = self.program.range(start, end);
    }

    fn current_url(&self) -> String {
        self.program
            .current_editor()
            .map(|e| e.url().to_string())
            .unwrap_or_default()
    }

    pub fn add_error(&mut self, kind: ErrorKind, tag: ErrorTag, message: impl Into<String>) {
        let range = self.position.clone();
        self.program.add_error(kind, tag, message, range);
    }

    fn stamp(&mut self, id: ValueId) -> Result<(), BuildError> {
        if let Some(range) = self.position.clone() {
            self.program.set_range(id, range)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Blocks
    // -----------------------------------------------------------------------

    pub fn new_block(&mut self, name: &str) -> Result<BlockId, BuildError> {
        let func = self.current_function()?;
        Ok(self.program.new_block(func, name)?)
    }

    pub fn switch_to_block(&mut self, block: BlockId) -> Result<(), BuildError> {
        let fi = self.top()?;
        self.frames[fi].current = block;
        Ok(())
    }

    /// Declares that all predecessors of `block` have been emitted.
    pub fn seal_block(&mut self, block: BlockId) -> Result<(), BuildError> {
        let fi = self.top()?;
        self.seal_in(fi, block)
    }

    /// `true` if the current block already ends in a terminator.
    pub fn is_terminated(&self) -> Result<bool, BuildError> {
        let block = self.current_block()?;
        Ok(match self.program.block(block)?.last_inst() {
            Some(last) => self.program.get(last)?.kind.is_terminator(),
            None => false,
        })
    }

    /// Jumps to `to` unless the current block is already terminated.
    pub fn emit_jump(&mut self, to: BlockId) -> Result<(), BuildError> {
        if !self.is_terminated()? {
            self.emit(InstKind::Jump { to })?;
        }
        Ok(())
    }

    /// Emits into the current block. Code after a terminator lands in a
    /// fresh block marked unreachable.
    pub(crate) fn emit(&mut self, kind: InstKind) -> Result<ValueId, BuildError> {
        if self.is_terminated()? {
            let dead = self.new_block("unreachable")?;
            self.program.block_mut(dead)?.reachability = Reachability::Unreachable;
            let fi = self.top()?;
            self.mark_sealed(fi, dead);
            self.switch_to_block(dead)?;
        }
        let block = self.current_block()?;
        let id = self.program.emit(block, kind)?;
        self.stamp(id)?;
        Ok(id)
    }

    // -----------------------------------------------------------------------
    // Parameters and constants
    // -----------------------------------------------------------------------

    pub fn declare_parameter(&mut self, name: &str) -> Result<ValueId, BuildError> {
        self.declare_parameter_with(name, None, false)
    }

    /// Declares a formal with an optional default value and by-reference
    /// flag, and binds it in the entry block.
    pub fn declare_parameter_with(
        &mut self,
        name: &str,
        default: Option<ValueId>,
        by_ref: bool,
    ) -> Result<ValueId, BuildError> {
        let fi = self.top()?;
        let func = self.frames[fi].func;
        let param = self.program.new_parameter(func, name)?;
        if let InstKind::Parameter {
            default: d,
            by_ref: r,
            ..
        } = &mut self.program.get_mut(param)?.kind
        {
            *d = default;
            *r = by_ref;
        }
        if let Some(default) = default {
            self.program.add_reference(param, default)?;
        }
        self.stamp(param)?;
        let entry = self.program.function(func)?.enter_block;
        if let Some(entry) = entry {
            self.write_in(fi, name, entry, param);
        }
        self.frames[fi].locals.insert(name.to_string());
        self.program.bind_variable(param, name)?;
        Ok(param)
    }

    pub fn const_value(&mut self, value: impl Into<ConstValue>) -> Result<ValueId, BuildError> {
        let func = self.current_function().ok();
        let id = self.program.new_const(func, value);
        self.stamp(id)?;
        Ok(id)
    }

    // -----------------------------------------------------------------------
    // Variables
    // -----------------------------------------------------------------------

    /// Value of `name` at the current point. Names nothing defines resolve
    /// to a package-level function of that name, or else to an `Undefined`
    /// value plus a diagnostic.
    pub fn read_variable(&mut self, name: &str) -> Result<ValueId, BuildError> {
        let fi = self.top()?;
        let block = self.frames[fi].current;
        if let Some(v) = self.read_in(fi, name, block)? {
            return Ok(v);
        }
        if let Some(f) = self.program.get_function(&self.package, name) {
            return Ok(f.into());
        }
        let func = self.frames[fi].func;
        let undefined = self
            .program
            .new_undefined(func, name, UndefinedKind::ValueInvalid)?;
        self.stamp(undefined)?;
        self.add_error(
            ErrorKind::Warn,
            ErrorTag::UndefinedValue,
            format!("value undefined: {}", name),
        );
        self.write_in(fi, name, block, undefined);
        Ok(undefined)
    }

    /// Looks a variable up without creating anything.
    pub fn peek_variable(&self, name: &str) -> Option<ValueId> {
        let fi = self.top().ok()?;
        self.peek_in(fi, name, self.frames[fi].current)
    }

    /// Binds `name` to `value` from here on. The previous value, if any, is
    /// kept as a mask of the new one. Assigning a name captured from an
    /// enclosing function records a side effect on the current function.
    pub fn assign_variable(&mut self, name: &str, value: ValueId) -> Result<(), BuildError> {
        let fi = self.top()?;
        let block = self.frames[fi].current;

        let captured = self.is_captured(fi, name);
        if captured {
            self.resolve_free_value(fi, name)?;
        }
        let previous = self.peek_in(fi, name, block).or_else(|| {
            let func = self.frames[fi].func;
            self.program
                .function(func)
                .ok()
                .and_then(|f| f.free_values.get(name).copied())
        });
        if let Some(prev) = previous {
            self.program.add_mask(value, prev)?;
        }

        self.write_in(fi, name, block, value);
        self.program.bind_variable(value, name)?;
        if let Some(range) = &self.position {
            let offset = range.start.offset;
            self.program.set_offset(offset, name, value);
        }

        if captured {
            let func = self.frames[fi].func;
            self.record_side_effect(
                func,
                FunctionSideEffect {
                    name: name.to_string(),
                    modify: value,
                    member: None,
                },
            )?;
        } else {
            self.frames[fi].locals.insert(name.to_string());
        }
        Ok(())
    }

    fn record_side_effect(
        &mut self,
        func: FunctionId,
        effect: FunctionSideEffect,
    ) -> Result<(), BuildError> {
        let f = self.program.function_mut(func)?;
        match f.side_effects.iter_mut().find(|s| s.name == effect.name) {
            Some(existing) => *existing = effect,
            None => f.side_effects.push(effect),
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Members
    // -----------------------------------------------------------------------

    fn member_name(&self, object: ValueId, key: ValueId) -> String {
        let obj = self
            .program
            .lookup(object)
            .map(|o| o.name.clone())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| object.to_string());
        match self.program.lookup(key).and_then(|k| k.const_value().cloned()) {
            Some(ConstValue::Str(s)) => format!("{}.{}", obj, s),
            Some(other) => format!("{}[{}]", obj, other),
            None => format!("{}[{}]", obj, key),
        }
    }

    /// If `object` is a formal or free value of the current function, the
    /// indirection kind a member of it goes through.
    fn member_call_kind(&self, object: ValueId) -> Option<(String, MemberCallKind)> {
        let func = self.current_function().ok()?;
        let inst = self.program.lookup(object)?;
        if inst.function != Some(func) {
            return None;
        }
        match inst.kind {
            InstKind::Parameter {
                index,
                is_free_value: false,
                ..
            } => Some((inst.name.clone(), MemberCallKind::Parameter { index })),
            InstKind::Parameter {
                is_free_value: true,
                ..
            } => Some((
                inst.name.clone(),
                MemberCallKind::FreeValue {
                    name: inst.name.clone(),
                },
            )),
            _ => None,
        }
    }

    /// Reads `object[key]`.
    ///
    /// A member of a formal that nobody assigned becomes a `ParameterMember`
    /// resolved per call site. A missing member of any other object becomes
    /// an `Undefined` member and a diagnostic.
    pub fn read_member(&mut self, object: ValueId, key: ValueId) -> Result<ValueId, BuildError> {
        if let Some(member) = self.program.get_member(object, key) {
            return Ok(member);
        }
        let name = self.member_name(object, key);
        let func = self.current_function()?;
        let member = match self.member_call_kind(object) {
            Some((object_name, kind)) => self.program.new_parameter_member(
                func,
                &name,
                ParameterMemberInner {
                    object_name,
                    kind,
                    key,
                },
            )?,
            None => {
                self.add_error(
                    ErrorKind::Warn,
                    ErrorTag::UndefinedMember,
                    format!("member undefined: {}", name),
                );
                self.program
                    .new_undefined(func, &name, UndefinedKind::MemberInvalid)?
            }
        };
        self.stamp(member)?;
        self.program.set_member(object, key, member)?;
        self.program.get_mut(member)?.verbose_name = name;
        Ok(member)
    }

    pub fn read_member_by_name(&mut self, object: ValueId, key: &str) -> Result<ValueId, BuildError> {
        let key = self.const_value(key)?;
        self.read_member(object, key)
    }

    /// Writes `object[key] = value`. Writing through a formal records a
    /// parameter-member side effect on the current function.
    pub fn assign_member(&mut self, object: ValueId, key: ValueId, value: ValueId) -> Result<(), BuildError> {
        if let Some(previous) = self.program.get_member(object, key) {
            self.program.add_mask(value, previous)?;
        }
        let name = self.member_name(object, key);
        self.program.set_member(object, key, value)?;
        self.program.get_mut(value)?.verbose_name = name.clone();

        if let Some((object_name, kind)) = self.member_call_kind(object) {
            let func = self.current_function()?;
            self.record_side_effect(
                func,
                FunctionSideEffect {
                    name,
                    modify: value,
                    member: Some(ParameterMemberInner {
                        object_name,
                        kind,
                        key,
                    }),
                },
            )?;
        }
        Ok(())
    }

    pub fn assign_member_by_name(&mut self, object: ValueId, key: &str, value: ValueId) -> Result<(), BuildError> {
        let key = self.const_value(key)?;
        self.assign_member(object, key, value)
    }

    /// Member value read at a call site for a callee's parameter member.
    /// A missing member is created as a valid-but-empty placeholder.
    fn call_site_member(&mut self, object: ValueId, key: ValueId) -> Result<ValueId, BuildError> {
        if let Some(member) = self.program.get_member(object, key) {
            return Ok(member);
        }
        let name = self.member_name(object, key);
        let func = self.current_function()?;
        let member = self
            .program
            .new_undefined(func, &name, UndefinedKind::MemberValid)?;
        self.program.set_member(object, key, member)?;
        Ok(member)
    }

    // -----------------------------------------------------------------------
    // Instructions
    // -----------------------------------------------------------------------

    pub fn emit_binop(&mut self, op: BinaryOp, x: ValueId, y: ValueId) -> Result<ValueId, BuildError> {
        self.emit(InstKind::BinOp { op, x, y })
    }

    pub fn emit_unop(&mut self, op: UnaryOp, x: ValueId) -> Result<ValueId, BuildError> {
        self.emit(InstKind::UnOp { op, x })
    }

    /// An empty object/container.
    pub fn emit_make(&mut self, ty: Option<SsaType>) -> Result<ValueId, BuildError> {
        let id = self.emit(InstKind::Make {
            parent: None,
            len: None,
            cap: None,
        })?;
        self.program.get_mut(id)?.ty = ty;
        Ok(id)
    }

    pub fn emit_type_cast(&mut self, value: ValueId, ty: SsaType) -> Result<ValueId, BuildError> {
        let id = self.emit(InstKind::TypeCast { value })?;
        self.program.get_mut(id)?.ty = Some(ty);
        Ok(id)
    }

    pub fn emit_type_value(&mut self, ty: SsaType) -> Result<ValueId, BuildError> {
        let id = self.emit(InstKind::TypeValue)?;
        self.program.get_mut(id)?.ty = Some(ty);
        Ok(id)
    }

    pub fn emit_next(&mut self, iter: ValueId, in_next: bool) -> Result<ValueId, BuildError> {
        self.emit(InstKind::Next { iter, in_next })
    }

    pub fn emit_assert(&mut self, cond: ValueId, msg: &str, msg_value: Option<ValueId>) -> Result<ValueId, BuildError> {
        self.emit(InstKind::Assert {
            cond,
            msg: msg.to_string(),
            msg_value,
        })
    }

    pub fn emit_panic(&mut self, info: ValueId) -> Result<ValueId, BuildError> {
        self.emit(InstKind::Panic { info })
    }

    pub fn emit_recover(&mut self) -> Result<ValueId, BuildError> {
        self.emit(InstKind::Recover)
    }

    pub fn emit_return(&mut self, results: Vec<ValueId>) -> Result<ValueId, BuildError> {
        self.emit(InstKind::Return { results })
    }

    pub fn emit_call(&mut self, method: ValueId, args: Vec<ValueId>) -> Result<ValueId, BuildError> {
        self.emit_call_with(Call::new(method, args))
    }

    /// Emits a call and replays the callee's side effects.
    ///
    /// When the callee is a known function: every free value it captures is
    /// bound from the caller's scope, every parameter member is resolved
    /// against this call's arguments into `arg_members`, and every recorded
    /// side effect becomes a `SideEffect` instruction that rebinds the
    /// variable or member in the caller.
    pub fn emit_call_with(&mut self, mut call: Call) -> Result<ValueId, BuildError> {
        let callee = self
            .program
            .lookup(call.method)
            .and_then(|i| i.as_function())
            .map(|f| {
                (
                    f.free_values.keys().cloned().collect::<Vec<_>>(),
                    f.parameter_members.clone(),
                    f.side_effects.clone(),
                )
            });
        let Some((free_values, parameter_members, side_effects)) = callee else {
            return self.emit(InstKind::Call(Box::new(call)));
        };

        let fi = self.top()?;
        let block = self.frames[fi].current;
        for name in free_values {
            if call.binding.contains_key(&name) {
                continue;
            }
            if let Some(v) = self.read_in(fi, &name, block)? {
                call.binding.insert(name, v);
            }
        }

        for pm in parameter_members {
            let inner = match &self.program.get(pm)?.kind {
                InstKind::ParameterMember { member, .. } => member.clone(),
                _ => continue,
            };
            let member = match inner.resolve(&call) {
                Some(object) => self.call_site_member(object, inner.key)?,
                None => {
                    let func = self.current_function()?;
                    self.program
                        .new_undefined(func, &inner.object_name, UndefinedKind::MemberValid)?
                }
            };
            call.arg_members.push(member);
        }

        let call_id = self.emit(InstKind::Call(Box::new(call)))?;

        for effect in side_effects {
            match &effect.member {
                None => {
                    let block = self.frames[fi].current;
                    let visible = self.read_in(fi, &effect.name, block)?.is_some()
                        || self.is_captured(fi, &effect.name);
                    if !visible {
                        continue;
                    }
                    let se = self.emit(InstKind::SideEffect {
                        call_site: call_id,
                        value: effect.modify,
                    })?;
                    self.program.get_mut(se)?.name = effect.name.clone();
                    self.assign_variable(&effect.name, se)?;
                }
                Some(inner) => {
                    let object = match self.program.get(call_id)?.as_call() {
                        Some(c) => inner.resolve(c),
                        None => None,
                    };
                    if let Some(object) = object {
                        let se = self.emit(InstKind::SideEffect {
                            call_site: call_id,
                            value: effect.modify,
                        })?;
                        self.program.get_mut(se)?.name = effect.name.clone();
                        self.assign_member(object, inner.key, se)?;
                    }
                }
            }
        }
        Ok(call_id)
    }

    // -----------------------------------------------------------------------
    // Includes
    // -----------------------------------------------------------------------

    /// Compiles another source file in place, inside the current function.
    ///
    /// The included file's editor is active only while it compiles; the
    /// outer editor is restored afterwards even if the nested build fails.
    /// A cached include is recorded as a hit but still compiled, because its
    /// code belongs to the current function.
    pub fn include_file(&mut self, path: &str) -> Result<(), BuildError> {
        let hook = self.include.ok_or_else(|| BuildError::Frontend {
            file: self.current_url(),
            message: format!("include of '{}' without a filesystem", path),
        })?;
        let source = hook.fs.read_file(path)?;
        let editor = SourceEditor::new(source).with_url(path);
        let hash = editor.source_hash().to_string();

        if hook.cache.is_some_and(|cache| cache.contains(self.program.name(), &hash)) {
            tracing::debug!(path, %hash, "included source cache hit");
            self.include_cache_hits.push((path.to_string(), hash.clone()));
        }

        self.program.add_include_file(path, hash.clone());
        if let Some(outer) = self.program.current_editor_mut() {
            outer.push_source_context(hash);
        }
        let saved_position = self.position.take();
        let text = editor.source().to_string();
        self.program.push_editor(editor);
        let result = hook.frontend.build(&text, hook.ignore_syntax_errors, self);
        self.program.pop_editor();
        self.position = saved_position;

        self.included.push(path.to_string());
        tracing::debug!(path, ok = result.is_ok(), "included file");
        result
    }
}
