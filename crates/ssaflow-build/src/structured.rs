//! Builders for structured control flow.
//!
//! Each builder collects closures for its parts and lays the blocks out when
//! `build` is called:
//!
//! ```text
//! if:     current -> if.cond [If] -> if.true ... -> if.done
//!                               \-> if.elif [If] -> ... -> if.false
//! loop:   current [init] -> loop.header [Loop] -> loop.body -> loop.latch [step] -> header
//!                                          \-> loop.exit
//! switch: current -> switch.head [Switch] -> switch.case* / switch.default -> switch.done
//! try:    current [ErrorHandler] -> error.try -> error.final? -> error.done
//!                     \-> error.catch*
//! ```
//!
//! The first block of every structure is reached through a `Jump`, so
//! [`Program::cfg_entry_instructions`](ssaflow_core::Program::cfg_entry_instructions)
//! on the block before it finds the branching instruction.

use ssaflow_core::{BlockId, ConstValue, InstKind, SwitchLabel, UndefinedKind, ValueId};

use crate::builder::Builder;
use crate::error::BuildError;
use crate::scope::LoopTargets;

type Step<'f, 'a, T> = Box<dyn FnOnce(&mut Builder<'a>) -> Result<T, BuildError> + 'f>;

// ---------------------------------------------------------------------------
// Loop targets
// ---------------------------------------------------------------------------

impl<'a> Builder<'a> {
    pub(crate) fn push_targets(&mut self, targets: LoopTargets) -> Result<(), BuildError> {
        let fi = self.frames.len().checked_sub(1).ok_or(BuildError::NoActiveFunction)?;
        self.frames[fi].loops.push(targets);
        Ok(())
    }

    pub(crate) fn pop_targets(&mut self) {
        if let Some(frame) = self.frames.last_mut() {
            frame.loops.pop();
        }
    }

    fn targets(&self, statement: &'static str) -> Result<LoopTargets, BuildError> {
        self.frames
            .last()
            .ok_or(BuildError::NoActiveFunction)?
            .loops
            .last()
            .copied()
            .ok_or(BuildError::NotInLoop { statement })
    }

    /// `break`: jumps to the exit of the innermost loop or switch.
    pub fn break_loop(&mut self) -> Result<(), BuildError> {
        let targets = self.targets("break")?;
        self.emit_jump(targets.break_to)
    }

    /// `continue`: jumps to the step block of the innermost loop.
    pub fn continue_loop(&mut self) -> Result<(), BuildError> {
        let targets = self.targets("continue")?;
        let to = targets
            .continue_to
            .ok_or(BuildError::NotInLoop { statement: "continue" })?;
        self.emit_jump(to)
    }

    /// Member of an internal value that always exists (iteration results,
    /// call-site members): a valid placeholder created on first access.
    pub(crate) fn valid_member(&mut self, object: ValueId, key: &str) -> Result<ValueId, BuildError> {
        if let Some(member) = self.program.get_string_member(object, key) {
            return Ok(member);
        }
        let func = self.current_function()?;
        let key_id = self.program.new_const(Some(func), key);
        let member = self
            .program
            .new_undefined(func, key, UndefinedKind::MemberValid)?;
        self.program.set_member(object, key_id, member)?;
        Ok(member)
    }

    /// Jumps from the current block into a fresh block and continues there.
    fn enter_block(&mut self, name: &str) -> Result<BlockId, BuildError> {
        let block = self.new_block(name)?;
        self.emit_jump(block)?;
        self.seal_block(block)?;
        self.switch_to_block(block)?;
        Ok(block)
    }
}

// ---------------------------------------------------------------------------
// If
// ---------------------------------------------------------------------------

/// An `if` / `else if` / `else` chain.
///
/// Every condition after the first is evaluated in the false block of the
/// previous `If`, so the chain is linked through `false_block` edges.
pub struct IfBuilder<'f, 'a> {
    branches: Vec<(Step<'f, 'a, ValueId>, Step<'f, 'a, ()>)>,
    otherwise: Option<Step<'f, 'a, ()>>,
}

impl<'f, 'a> Default for IfBuilder<'f, 'a> {
    fn default() -> Self {
        IfBuilder {
            branches: Vec::new(),
            otherwise: None,
        }
    }
}

impl<'f, 'a> IfBuilder<'f, 'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an `if` (first call) or `else if` branch.
    pub fn branch<C, B>(mut self, cond: C, body: B) -> Self
    where
        C: FnOnce(&mut Builder<'a>) -> Result<ValueId, BuildError> + 'f,
        B: FnOnce(&mut Builder<'a>) -> Result<(), BuildError> + 'f,
    {
        self.branches.push((Box::new(cond), Box::new(body)));
        self
    }

    pub fn otherwise<B>(mut self, body: B) -> Self
    where
        B: FnOnce(&mut Builder<'a>) -> Result<(), BuildError> + 'f,
    {
        self.otherwise = Some(Box::new(body));
        self
    }

    /// Lays the chain out and returns the ids of its `If` instructions in
    /// source order. Building continues in the `if.done` block.
    pub fn build(self, b: &mut Builder<'a>) -> Result<Vec<ValueId>, BuildError> {
        if self.branches.is_empty() {
            return Err(BuildError::Frontend {
                file: String::new(),
                message: "if statement without a condition".to_string(),
            });
        }
        let done = b.new_block("if.done")?;
        b.enter_block("if.cond")?;

        let count = self.branches.len();
        let mut otherwise = self.otherwise;
        let mut ifs = Vec::with_capacity(count);
        for (i, (cond, body)) in self.branches.into_iter().enumerate() {
            let cond = cond(b)?;
            let then = b.new_block("if.true")?;
            let last = i + 1 == count;
            let next = match (last, otherwise.is_some()) {
                (false, _) => b.new_block("if.elif")?,
                (true, true) => b.new_block("if.false")?,
                (true, false) => done,
            };
            let if_inst = b.emit(InstKind::If {
                cond,
                true_block: then,
                false_block: Some(next),
            })?;
            ifs.push(if_inst);

            b.seal_block(then)?;
            b.switch_to_block(then)?;
            body(b)?;
            b.emit_jump(done)?;

            if next != done {
                b.seal_block(next)?;
                b.switch_to_block(next)?;
            }
        }
        if let Some(body) = otherwise.take() {
            body(b)?;
            b.emit_jump(done)?;
        }

        b.seal_block(done)?;
        b.switch_to_block(done)?;
        Ok(ifs)
    }
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

/// Names bound on each iteration of a `for k, v in iter` loop.
struct Iteration {
    iter: ValueId,
    key: Option<String>,
    value: Option<String>,
}

/// A loop: `for init; cond; step { body }`, `while cond { body }`, or an
/// iteration over a collection.
pub struct LoopBuilder<'f, 'a> {
    init: Option<Step<'f, 'a, ValueId>>,
    cond: Option<Step<'f, 'a, ValueId>>,
    step: Option<Step<'f, 'a, ValueId>>,
    body: Option<Step<'f, 'a, ()>>,
    iteration: Option<Iteration>,
}

impl<'f, 'a> Default for LoopBuilder<'f, 'a> {
    fn default() -> Self {
        LoopBuilder {
            init: None,
            cond: None,
            step: None,
            body: None,
            iteration: None,
        }
    }
}

impl<'f, 'a> LoopBuilder<'f, 'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs once before the loop, in the current block.
    pub fn init<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut Builder<'a>) -> Result<ValueId, BuildError> + 'f,
    {
        self.init = Some(Box::new(f));
        self
    }

    /// Evaluated in the loop header before every iteration. Without one the
    /// loop runs on a constant `true`.
    pub fn condition<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut Builder<'a>) -> Result<ValueId, BuildError> + 'f,
    {
        self.cond = Some(Box::new(f));
        self
    }

    /// Runs after every iteration; `continue` jumps here.
    pub fn step<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut Builder<'a>) -> Result<ValueId, BuildError> + 'f,
    {
        self.step = Some(Box::new(f));
        self
    }

    pub fn body<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut Builder<'a>) -> Result<(), BuildError> + 'f,
    {
        self.body = Some(Box::new(f));
        self
    }

    /// Iterates `iter`, binding the current key and value to the given names
    /// at the top of the body. The header emits a `Next` whose `ok` member is
    /// the loop condition and whose `key` member becomes the loop key.
    pub fn iterate(mut self, iter: ValueId, key: Option<&str>, value: Option<&str>) -> Self {
        self.iteration = Some(Iteration {
            iter,
            key: key.map(str::to_string),
            value: value.map(str::to_string),
        });
        self
    }

    /// Lays the loop out and returns the `Loop` instruction. Building
    /// continues in the `loop.exit` block.
    pub fn build(self, b: &mut Builder<'a>) -> Result<ValueId, BuildError> {
        let init = match self.init {
            Some(init) => Some(init(b)?),
            None => None,
        };

        let header = b.new_block("loop.header")?;
        b.emit_jump(header)?;
        b.switch_to_block(header)?;

        let (cond, key, bound) = match &self.iteration {
            Some(it) => {
                let next = b.emit_next(it.iter, true)?;
                let ok = b.valid_member(next, "ok")?;
                let key = b.valid_member(next, "key")?;
                let field = b.valid_member(next, "field")?;
                (ok, Some(key), Some((key, field)))
            }
            None => {
                let cond = match self.cond {
                    Some(cond) => cond(b)?,
                    None => b.const_value(ConstValue::Bool(true))?,
                };
                (cond, None, None)
            }
        };

        let body = b.new_block("loop.body")?;
        let exit = b.new_block("loop.exit")?;
        let latch = b.new_block("loop.latch")?;
        let loop_inst = b.emit(InstKind::Loop {
            body,
            exit,
            init,
            cond: Some(cond),
            step: None,
            key,
        })?;

        b.seal_block(body)?;
        b.switch_to_block(body)?;
        if let (Some(it), Some((key, field))) = (&self.iteration, bound) {
            if let Some(name) = &it.key {
                b.assign_variable(name, key)?;
            }
            if let Some(name) = &it.value {
                b.assign_variable(name, field)?;
            }
        }
        b.push_targets(LoopTargets {
            continue_to: Some(latch),
            break_to: exit,
        })?;
        let result = match self.body {
            Some(body) => body(b),
            None => Ok(()),
        };
        b.pop_targets();
        result?;
        b.emit_jump(latch)?;

        b.seal_block(latch)?;
        b.switch_to_block(latch)?;
        if let Some(step) = self.step {
            let step = step(b)?;
            b.program_mut().update_operands(loop_inst, |kind| {
                if let InstKind::Loop { step: s, .. } = kind {
                    *s = Some(step);
                }
            })?;
        }
        b.emit_jump(header)?;

        b.seal_block(header)?;
        b.seal_block(exit)?;
        b.switch_to_block(exit)?;
        Ok(loop_inst)
    }
}

// ---------------------------------------------------------------------------
// Switch
// ---------------------------------------------------------------------------

/// A `switch` with value labels and an optional default.
pub struct SwitchBuilder<'f, 'a> {
    cond: Step<'f, 'a, ValueId>,
    cases: Vec<(Step<'f, 'a, Vec<ValueId>>, Step<'f, 'a, ()>)>,
    default: Option<Step<'f, 'a, ()>>,
    fallthrough: bool,
}

impl<'f, 'a> SwitchBuilder<'f, 'a> {
    pub fn new<C>(cond: C) -> Self
    where
        C: FnOnce(&mut Builder<'a>) -> Result<ValueId, BuildError> + 'f,
    {
        SwitchBuilder {
            cond: Box::new(cond),
            cases: Vec::new(),
            default: None,
            fallthrough: false,
        }
    }

    /// A case with one or more label values. Labels are evaluated in the
    /// switch head, in case order.
    pub fn case<L, B>(mut self, labels: L, body: B) -> Self
    where
        L: FnOnce(&mut Builder<'a>) -> Result<Vec<ValueId>, BuildError> + 'f,
        B: FnOnce(&mut Builder<'a>) -> Result<(), BuildError> + 'f,
    {
        self.cases.push((Box::new(labels), Box::new(body)));
        self
    }

    pub fn default<B>(mut self, body: B) -> Self
    where
        B: FnOnce(&mut Builder<'a>) -> Result<(), BuildError> + 'f,
    {
        self.default = Some(Box::new(body));
        self
    }

    /// C-style cases: a body that does not `break` runs into the next case.
    pub fn fallthrough(mut self, fallthrough: bool) -> Self {
        self.fallthrough = fallthrough;
        self
    }

    /// Lays the switch out and returns the `Switch` instruction. Building
    /// continues in the `switch.done` block.
    pub fn build(self, b: &mut Builder<'a>) -> Result<ValueId, BuildError> {
        let done = b.new_block("switch.done")?;
        b.enter_block("switch.head")?;
        let cond = (self.cond)(b)?;

        let mut labels = Vec::new();
        let mut bodies = Vec::with_capacity(self.cases.len());
        for (case_labels, body) in self.cases {
            let dest = b.new_block("switch.case")?;
            for value in case_labels(b)? {
                labels.push(SwitchLabel { value, dest });
            }
            bodies.push((dest, body));
        }
        let default = match &self.default {
            Some(_) => Some(b.new_block("switch.default")?),
            None => None,
        };
        let switch = b.emit(InstKind::Switch {
            cond,
            default_block: Some(default.unwrap_or(done)),
            labels,
        })?;

        let continue_to = b
            .frames
            .last()
            .and_then(|f| f.loops.last())
            .and_then(|t| t.continue_to);
        b.push_targets(LoopTargets {
            continue_to,
            break_to: done,
        })?;

        let mut blocks: Vec<BlockId> = bodies.iter().map(|(dest, _)| *dest).collect();
        blocks.extend(default);
        let mut steps: Vec<Step<'f, 'a, ()>> = bodies.into_iter().map(|(_, body)| body).collect();
        steps.extend(self.default);

        let fallthrough = self.fallthrough;
        let run_cases = || -> Result<(), BuildError> {
            for (i, body) in steps.into_iter().enumerate() {
                let block = blocks[i];
                let after = match (fallthrough, blocks.get(i + 1)) {
                    (true, Some(next)) => *next,
                    _ => done,
                };
                b.seal_block(block)?;
                b.switch_to_block(block)?;
                body(b)?;
                b.emit_jump(after)?;
            }
            Ok(())
        };
        let result = run_cases();
        b.pop_targets();
        result?;

        b.seal_block(done)?;
        b.switch_to_block(done)?;
        Ok(switch)
    }
}

// ---------------------------------------------------------------------------
// Try
// ---------------------------------------------------------------------------

/// `try { } catch (e) { } finally { }`.
pub struct TryBuilder<'f, 'a> {
    body: Step<'f, 'a, ()>,
    catches: Vec<(Option<String>, Step<'f, 'a, ()>)>,
    finally: Option<Step<'f, 'a, ()>>,
}

impl<'f, 'a> TryBuilder<'f, 'a> {
    pub fn new<B>(body: B) -> Self
    where
        B: FnOnce(&mut Builder<'a>) -> Result<(), BuildError> + 'f,
    {
        TryBuilder {
            body: Box::new(body),
            catches: Vec::new(),
            finally: None,
        }
    }

    /// A catch clause, optionally binding the error to `name`.
    pub fn catch<B>(mut self, name: Option<&str>, body: B) -> Self
    where
        B: FnOnce(&mut Builder<'a>) -> Result<(), BuildError> + 'f,
    {
        self.catches.push((name.map(str::to_string), Box::new(body)));
        self
    }

    pub fn finally<B>(mut self, body: B) -> Self
    where
        B: FnOnce(&mut Builder<'a>) -> Result<(), BuildError> + 'f,
    {
        self.finally = Some(Box::new(body));
        self
    }

    /// Lays the statement out and returns the `ErrorHandler`. Building
    /// continues in the `error.done` block.
    pub fn build(self, b: &mut Builder<'a>) -> Result<ValueId, BuildError> {
        let try_block = b.new_block("error.try")?;
        let mut catches = Vec::with_capacity(self.catches.len());
        for _ in &self.catches {
            catches.push(b.new_block("error.catch")?);
        }
        let finally = match &self.finally {
            Some(_) => Some(b.new_block("error.final")?),
            None => None,
        };
        let done = b.new_block("error.done")?;
        let after = finally.unwrap_or(done);

        let handler = b.emit(InstKind::ErrorHandler {
            try_block,
            catches: catches.clone(),
            finally,
            done: Some(done),
        })?;
        b.program_mut().block_mut(try_block)?.handler = Some(handler);
        b.emit_jump(try_block)?;

        b.seal_block(try_block)?;
        b.switch_to_block(try_block)?;
        (self.body)(b)?;
        b.emit_jump(after)?;

        for (block, (name, body)) in catches.into_iter().zip(self.catches) {
            b.seal_block(block)?;
            b.switch_to_block(block)?;
            b.program_mut().block_mut(block)?.handler = Some(handler);
            if let Some(name) = name {
                let func = b.current_function()?;
                let err = b
                    .program_mut()
                    .new_undefined(func, &name, UndefinedKind::ValueValid)?;
                b.assign_variable(&name, err)?;
            }
            body(b)?;
            b.emit_jump(after)?;
        }

        if let (Some(block), Some(body)) = (finally, self.finally) {
            b.seal_block(block)?;
            b.switch_to_block(block)?;
            body(b)?;
            b.emit_jump(done)?;
        }

        b.seal_block(done)?;
        b.switch_to_block(done)?;
        Ok(handler)
    }
}
