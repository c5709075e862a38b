//! Top-def and bottom-def tracing.
//!
//! A top-def trace walks operands backwards to the values a value is made
//! of: constants, fresh objects, unresolved calls and formals nobody
//! supplies. A bottom-def trace walks users forwards to where a value ends
//! up: branch conditions, asserts, panics, unresolved calls and values
//! nothing consumes.
//!
//! Both walks cross function boundaries. Entering a callee pushes the call
//! instruction; a formal, free value or parameter member reached inside the
//! callee is then resolved against that call's arguments, bindings and
//! member reads. With no call on the stack, `cross_call_stack` resolves it
//! against every call site of the function instead.

use std::collections::HashSet;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use ssaflow_core::{Call, FunctionId, InstKind, Instruction, ParameterMemberInner, Program, ValueId};

use crate::error::QueryError;
use crate::operator::{ValueHandle, ValueOperator};
use crate::query::Query;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceOptions {
    /// Resolve formals against every call site when no call is on the stack.
    pub cross_call_stack: bool,
    /// Longest operand or user chain followed before failing.
    pub max_depth: usize,
    /// Report calls to unknown functions as results. When off, traces pass
    /// through them to their arguments (top) or their result (bottom).
    pub include_unresolved_calls: bool,
}

impl Default for TraceOptions {
    fn default() -> Self {
        TraceOptions {
            cross_call_stack: true,
            max_depth: 1000,
            include_unresolved_calls: true,
        }
    }
}

impl<'p> Query<'p> {
    /// Values `input` is defined by.
    pub fn top_defs(
        &self,
        input: &ValueOperator,
        options: &TraceOptions,
    ) -> Result<Vec<ValueHandle>, QueryError> {
        self.trace(input, options, Direction::Top)
    }

    /// Values `input` flows into.
    pub fn bottom_defs(
        &self,
        input: &ValueOperator,
        options: &TraceOptions,
    ) -> Result<Vec<ValueHandle>, QueryError> {
        self.trace(input, options, Direction::Bottom)
    }

    fn trace(
        &self,
        input: &ValueOperator,
        options: &TraceOptions,
        direction: Direction,
    ) -> Result<Vec<ValueHandle>, QueryError> {
        let mut out: IndexSet<ValueHandle> = IndexSet::new();
        for handle in self.values(input)? {
            let program = self.program(&handle.program)?;
            let mut tracer = Tracer::new(program, options);
            tracer.run(handle.id, direction)?;
            tracing::debug!(
                start = %handle,
                ?direction,
                results = tracer.found.len(),
                visited = tracer.visited.len(),
                "trace"
            );
            out.extend(
                tracer
                    .found
                    .into_iter()
                    .map(|id| ValueHandle::new(handle.program.clone(), id)),
            );
        }
        Ok(out.into_iter().collect())
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Top,
    Bottom,
}

/// Pending work of a trace.
enum Step {
    Visit(Frame),
    Found(ValueId),
}

struct Frame {
    id: ValueId,
    depth: usize,
    /// Calls entered, innermost last.
    stack: Vec<ValueId>,
}

impl Frame {
    fn root(id: ValueId) -> Self {
        Frame {
            id,
            depth: 0,
            stack: Vec::new(),
        }
    }

    fn visit(&self, id: ValueId, stack: Vec<ValueId>) -> Step {
        Step::Visit(Frame {
            id,
            depth: self.depth + 1,
            stack,
        })
    }

    /// Continues at `id` in the same call context.
    fn step(&self, id: ValueId) -> Step {
        self.visit(id, self.stack.clone())
    }

    fn enter_call(&self, id: ValueId, call: ValueId) -> Step {
        let mut stack = self.stack.clone();
        stack.push(call);
        self.visit(id, stack)
    }

    fn leave_call(&self, id: ValueId) -> Step {
        let mut stack = self.stack.clone();
        stack.pop();
        self.visit(id, stack)
    }

    /// Continues at `id` with no call context.
    fn detached(&self, id: ValueId) -> Step {
        self.visit(id, Vec::new())
    }
}

struct Tracer<'p, 'o> {
    program: &'p Program,
    options: &'o TraceOptions,
    /// `(value, innermost call)` pairs already walked.
    visited: HashSet<(ValueId, Option<ValueId>)>,
    found: IndexSet<ValueId>,
}

impl<'p, 'o> Tracer<'p, 'o> {
    fn new(program: &'p Program, options: &'o TraceOptions) -> Self {
        Tracer {
            program,
            options,
            visited: HashSet::new(),
            found: IndexSet::new(),
        }
    }

    /// Walks from `start` depth first. Steps are pushed in reverse so
    /// results come out in the order a recursive walk would find them.
    fn run(&mut self, start: ValueId, direction: Direction) -> Result<(), QueryError> {
        let mut work = vec![Step::Visit(Frame::root(start))];
        let mut next = Vec::new();
        while let Some(step) = work.pop() {
            let frame = match step {
                Step::Found(id) => {
                    self.found.insert(id);
                    continue;
                }
                Step::Visit(frame) => frame,
            };
            match direction {
                Direction::Top => self.top(&frame, &mut next)?,
                Direction::Bottom => self.bottom(&frame, &mut next)?,
            }
            work.extend(next.drain(..).rev());
        }
        Ok(())
    }

    fn enter(&mut self, frame: &Frame) -> Result<Option<&'p Instruction>, QueryError> {
        if frame.depth > self.options.max_depth {
            return Err(QueryError::RecursionLimit {
                depth: frame.depth,
                limit: self.options.max_depth,
            });
        }
        if !self.visited.insert((frame.id, frame.stack.last().copied())) {
            return Ok(None);
        }
        Ok(self.program.lookup(frame.id))
    }

    /// The function `call` invokes, if it is one of this program's.
    fn callee(&self, call: &Call) -> Option<FunctionId> {
        self.program
            .lookup(call.method)
            .and_then(|m| m.as_function())
            .map(|_| call.method.as_function())
    }

    fn callee_of(&self, call_id: ValueId) -> Option<FunctionId> {
        self.program
            .lookup(call_id)
            .and_then(|i| i.as_call())
            .and_then(|c| self.callee(c))
    }

    /// Calls anywhere in the program that invoke `func` directly.
    fn call_sites(&self, func: FunctionId) -> Vec<ValueId> {
        let target = ValueId::from(func);
        let Some(inst) = self.program.lookup(target) else {
            return Vec::new();
        };
        inst.users()
            .iter()
            .copied()
            .filter(|u| {
                self.program
                    .lookup(*u)
                    .and_then(|i| i.as_call())
                    .is_some_and(|c| c.method == target)
            })
            .collect()
    }

    /// The innermost call of `stack`, if it invoked `func`.
    fn current_call(&self, stack: &[ValueId], func: Option<FunctionId>) -> Option<&'p Call> {
        let call_id = *stack.last()?;
        if func.is_none() || self.callee_of(call_id) != func {
            return None;
        }
        self.program.lookup(call_id)?.as_call()
    }

    // -----------------------------------------------------------------------
    // Top-def
    // -----------------------------------------------------------------------

    fn top(&mut self, frame: &Frame, out: &mut Vec<Step>) -> Result<(), QueryError> {
        let Some(inst) = self.enter(frame)? else {
            return Ok(());
        };
        let id = frame.id;
        match &inst.kind {
            InstKind::Phi { edges, .. } => out.extend(edges.iter().map(|e| frame.step(*e))),
            InstKind::BinOp { x, y, .. } => out.extend([frame.step(*x), frame.step(*y)]),
            InstKind::UnOp { x, .. } => out.push(frame.step(*x)),
            InstKind::TypeCast { value } => out.push(frame.step(*value)),
            InstKind::Next { iter, .. } => out.push(frame.step(*iter)),
            InstKind::Return { results } => out.extend(results.iter().map(|r| frame.step(*r))),
            InstKind::SideEffect { call_site, value } => {
                if !frame.stack.contains(call_site) {
                    out.push(frame.enter_call(*value, *call_site));
                }
            }
            InstKind::Call(call) => self.top_call(frame, call, out)?,
            InstKind::Parameter {
                index,
                is_free_value,
                default,
                ..
            } => {
                let (index, is_free_value, name) = (*index, *is_free_value, inst.name.as_str());
                let actual = move |call: &Call| {
                    if is_free_value {
                        call.binding.get(name).copied()
                    } else {
                        call.args.get(index).copied()
                    }
                };
                if let (Some(call), Some(default)) =
                    (self.current_call(&frame.stack, inst.function), default)
                {
                    if actual(call).is_none() {
                        out.push(frame.step(*default));
                        return Ok(());
                    }
                }
                self.top_formal(frame, inst.function, actual, out);
            }
            InstKind::ParameterMember { index, member } => {
                let (program, index) = (self.program, *index);
                self.top_formal(
                    frame,
                    inst.function,
                    |call: &Call| member_at(program, call, index, member),
                    out,
                );
            }
            InstKind::Undefined { .. } => match inst.object() {
                Some(object) => out.push(frame.step(object)),
                None => out.push(Step::Found(id)),
            },
            _ => out.push(Step::Found(id)),
        }
        Ok(())
    }

    fn top_call(&self, frame: &Frame, call: &'p Call, out: &mut Vec<Step>) -> Result<(), QueryError> {
        let id = frame.id;
        let Some(func) = self.callee(call) else {
            if self.options.include_unresolved_calls {
                out.push(Step::Found(id));
            } else {
                out.extend(call.args.iter().map(|a| frame.step(*a)));
            }
            return Ok(());
        };
        if frame.stack.contains(&id) {
            out.push(Step::Found(id));
            return Ok(());
        }
        let function = self.program.function(func)?;
        let results: Vec<ValueId> = function
            .returns
            .iter()
            .filter_map(|r| match self.program.lookup(*r).map(|i| &i.kind) {
                Some(InstKind::Return { results }) => Some(results.iter().copied()),
                _ => None,
            })
            .flatten()
            .collect();
        if results.is_empty() {
            out.push(Step::Found(id));
            return Ok(());
        }
        out.extend(results.into_iter().map(|r| frame.enter_call(r, id)));
        Ok(())
    }

    /// Resolves a formal of `func` through the call that entered it, or
    /// through every call site when none did.
    fn top_formal<F>(&self, frame: &Frame, func: Option<FunctionId>, actual: F, out: &mut Vec<Step>)
    where
        F: Fn(&Call) -> Option<ValueId>,
    {
        if let Some(call) = self.current_call(&frame.stack, func) {
            match actual(call) {
                Some(value) => out.push(frame.leave_call(value)),
                None => out.push(Step::Found(frame.id)),
            }
            return;
        }

        let sites = match func {
            Some(func) if self.options.cross_call_stack => self.call_sites(func),
            _ => Vec::new(),
        };
        let actuals: Vec<ValueId> = sites
            .iter()
            .filter_map(|s| self.program.lookup(*s)?.as_call())
            .filter_map(&actual)
            .collect();
        if actuals.is_empty() {
            out.push(Step::Found(frame.id));
            return;
        }
        out.extend(actuals.into_iter().map(|v| frame.detached(v)));
    }

    // -----------------------------------------------------------------------
    // Bottom-def
    // -----------------------------------------------------------------------

    fn bottom(&mut self, frame: &Frame, out: &mut Vec<Step>) -> Result<(), QueryError> {
        let Some(inst) = self.enter(frame)? else {
            return Ok(());
        };
        let id = frame.id;
        if !inst.has_users() {
            out.push(Step::Found(id));
            return Ok(());
        }
        for user_id in inst.users().iter().copied() {
            let Some(user) = self.program.lookup(user_id) else {
                continue;
            };
            match &user.kind {
                InstKind::Call(call) => self.bottom_call(frame, user_id, call, out)?,
                InstKind::Return { .. } => self.bottom_return(frame, user_id, user.function, out),
                InstKind::SideEffect { value, .. } => {
                    if *value == id {
                        out.push(frame.step(user_id));
                    }
                }
                InstKind::Phi { .. }
                | InstKind::BinOp { .. }
                | InstKind::UnOp { .. }
                | InstKind::TypeCast { .. }
                | InstKind::Next { .. }
                | InstKind::Make { .. } => out.push(frame.step(user_id)),
                _ => out.push(Step::Found(user_id)),
            }
        }
        Ok(())
    }

    fn bottom_call(
        &self,
        frame: &Frame,
        call_id: ValueId,
        call: &'p Call,
        out: &mut Vec<Step>,
    ) -> Result<(), QueryError> {
        let id = frame.id;
        if call.method == id {
            out.push(Step::Found(call_id));
            return Ok(());
        }
        let Some(func) = self.callee(call) else {
            if self.options.include_unresolved_calls {
                out.push(Step::Found(call_id));
            } else {
                out.push(frame.step(call_id));
            }
            return Ok(());
        };
        if frame.stack.contains(&call_id) {
            return Ok(());
        }
        let function = self.program.function(func)?;
        let mut formals: Vec<ValueId> = Vec::new();
        for (i, arg) in call.args.iter().enumerate() {
            if *arg == id {
                formals.extend(function.params.get(i));
            }
        }
        for (name, bound) in &call.binding {
            if *bound == id {
                formals.extend(function.free_values.get(name));
            }
        }
        for (i, member) in call.arg_members.iter().enumerate() {
            if *member == id {
                formals.extend(function.parameter_members.get(i));
            }
        }
        if formals.is_empty() {
            tracing::warn!(call = %call_id, value = %id, "call uses value in no known slot");
            return Ok(());
        }
        out.extend(formals.into_iter().map(|f| frame.enter_call(f, call_id)));
        Ok(())
    }

    fn bottom_return(&self, frame: &Frame, ret: ValueId, func: Option<FunctionId>, out: &mut Vec<Step>) {
        if self.current_call(&frame.stack, func).is_some() {
            if let Some(call_id) = frame.stack.last() {
                out.push(frame.leave_call(*call_id));
            }
            return;
        }

        let sites = match func {
            Some(func) if self.options.cross_call_stack => self.call_sites(func),
            _ => Vec::new(),
        };
        if sites.is_empty() {
            out.push(Step::Found(ret));
            return;
        }
        out.extend(sites.into_iter().map(|s| frame.detached(s)));
    }
}

/// The concrete value a parameter member stands for at `call`: the member
/// read at the call site, or failing that the object it belongs to.
fn member_at(
    program: &Program,
    call: &Call,
    index: usize,
    member: &ParameterMemberInner,
) -> Option<ValueId> {
    let defined = |id: &ValueId| program.lookup(*id).is_some_and(|i| !i.is_undefined());
    if let Some(read) = call.arg_members.get(index).filter(|m| defined(m)) {
        return Some(*read);
    }
    let object = member.resolve(call)?;
    match program.get_member(object, member.key) {
        Some(m) if defined(&m) => Some(m),
        _ => Some(object),
    }
}
