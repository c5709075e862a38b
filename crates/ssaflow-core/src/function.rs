//! Function definitions with closure and side-effect support.
//!
//! A [`Function`] is the payload of an `InstKind::Function` arena entry, so a
//! function is also a value: it can be passed as a call argument or stored in
//! a variable. Its body lives as blocks and instructions in the program arena
//! owned by this function's id.
//!
//! Closures are functions with a `parent`. Names a closure reads from an
//! enclosing scope become free-value parameters recorded in
//! [`free_values`](Function::free_values); a call site supplies the concrete
//! value through `Call::binding`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::id::{BlockId, FunctionId, ValueId};
use crate::inst::ParameterMemberInner;

/// Non-local mutation performed by a function body.
///
/// Recorded when a closure assigns a captured variable, or when a body
/// assigns a member of one of its parameters. Call sites replay the effect
/// with a `SideEffect` instruction instead of re-walking the body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSideEffect {
    /// Variable name (or member verbose name) that is modified.
    pub name: String,
    /// Value written by the body.
    pub modify: ValueId,
    /// Set when the target is a member of a formal rather than a captured
    /// variable; resolved against each call's arguments.
    pub member: Option<ParameterMemberInner>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub package: String,
    /// Positional formal parameters in declaration order.
    pub params: Vec<ValueId>,
    /// Captured name -> free-value parameter.
    pub free_values: IndexMap<String, ValueId>,
    pub parameter_members: Vec<ValueId>,
    pub side_effects: Vec<FunctionSideEffect>,
    pub parent: Option<FunctionId>,
    pub child_funcs: Vec<FunctionId>,
    /// Every `Return` instruction seen in the body.
    pub returns: Vec<ValueId>,
    pub blocks: Vec<BlockId>,
    pub enter_block: Option<BlockId>,
    pub exit_block: Option<BlockId>,
    pub defer_block: Option<BlockId>,
    pub is_method: bool,
    pub method_name: String,
    pub variadic: bool,
    pub(crate) finished: bool,
}

impl Function {
    pub fn new(package: impl Into<String>, parent: Option<FunctionId>) -> Self {
        Function {
            package: package.into(),
            params: Vec::new(),
            free_values: IndexMap::new(),
            parameter_members: Vec::new(),
            side_effects: Vec::new(),
            parent,
            child_funcs: Vec::new(),
            returns: Vec::new(),
            blocks: Vec::new(),
            enter_block: None,
            exit_block: None,
            defer_block: None,
            is_method: false,
            method_name: String::new(),
            variadic: false,
            finished: false,
        }
    }

    /// Returns `true` if this function is declared inside another function.
    pub fn is_closure(&self) -> bool {
        self.parent.is_some()
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn has_side_effects(&self) -> bool {
        !self.side_effects.is_empty()
    }
}
