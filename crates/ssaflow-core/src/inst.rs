//! Instruction vocabulary of the SSA graph.
//!
//! Every arena entry is an [`Instruction`]: a common header (id, name,
//! position, owning function/block, type) plus the value-side edge tables
//! (users, masks, references, members) and an [`InstKind`] payload. Blocks
//! and functions are instructions too, which lets a function be passed as a
//! call argument and a block be addressed by the same id space.
//!
//! Operands are stored by id inside the payload. The inverse relation, the
//! `users` set, is maintained by the program's use-def methods (see
//! `usedef.rs`); payloads are never edited directly once inserted.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::block::BasicBlock;
use crate::editor::Range;
use crate::function::Function;
use crate::id::{BlockId, FunctionId, ValueId};
use crate::types::{ConstValue, SsaType};

/// Operand list returned by [`InstKind::operands`].
pub type Operands = SmallVec<[ValueId; 4]>;

/// Discriminant of an instruction payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    Function,
    BasicBlock,
    Phi,
    Parameter,
    ParameterMember,
    Const,
    Undefined,
    BinOp,
    UnOp,
    Call,
    SideEffect,
    Return,
    Make,
    Next,
    Assert,
    TypeCast,
    TypeValue,
    ErrorHandler,
    Panic,
    Recover,
    Jump,
    If,
    Loop,
    Switch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    LogicAnd,
    LogicOr,
    In,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::LogicAnd => "&&",
            BinaryOp::LogicOr => "||",
            BinaryOp::In => "in",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "^",
        }
    }
}

/// Why a value is undefined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UndefinedKind {
    /// Read of a name nothing defines.
    ValueInvalid,
    /// Declared but never assigned.
    ValueValid,
    /// Member read of a key the object does not have.
    MemberInvalid,
    /// Key exists but carries no value yet; not an error.
    MemberValid,
}

/// Which formal the member indirection goes through.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberCallKind {
    /// Member of positional parameter `index`; resolves to `Call::args[index]`.
    Parameter { index: usize },
    /// Member of captured free value `name`; resolves to `Call::binding[name]`.
    FreeValue { name: String },
}

/// "Member `key` of some formal", recorded without knowing the concrete
/// object. A call site supplies the object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParameterMemberInner {
    pub object_name: String,
    pub kind: MemberCallKind,
    pub key: ValueId,
}

impl ParameterMemberInner {
    /// Returns the concrete object this indirection refers to at `call`.
    ///
    /// An out-of-range index or a missing binding is not an error: the call
    /// site simply does not resolve the indirection.
    pub fn resolve(&self, call: &Call) -> Option<ValueId> {
        match &self.kind {
            MemberCallKind::Parameter { index } => call.args.get(*index).copied(),
            MemberCallKind::FreeValue { name } => call.binding.get(name).copied(),
        }
    }
}

/// Invocation of `method` with positional `args`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub method: ValueId,
    pub args: Vec<ValueId>,
    /// Free-value name -> value supplied by the caller's scope.
    pub binding: IndexMap<String, ValueId>,
    /// Concrete member values read at this call site, aligned with the
    /// callee's `parameter_members`.
    pub arg_members: Vec<ValueId>,
    pub is_async: bool,
    pub unpack: bool,
    pub drop_error: bool,
    pub ellipsis: bool,
}

impl Call {
    pub fn new(method: ValueId, args: Vec<ValueId>) -> Self {
        Call {
            method,
            args,
            binding: IndexMap::new(),
            arg_members: Vec::new(),
            is_async: false,
            unpack: false,
            drop_error: false,
            ellipsis: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchLabel {
    pub value: ValueId,
    pub dest: BlockId,
}

/// Instruction payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InstKind {
    Function(Box<Function>),
    Block(Box<BasicBlock>),
    /// `edges[i]` flows in along `block.preds[i]`.
    Phi {
        edges: Vec<ValueId>,
    },
    Parameter {
        index: usize,
        is_free_value: bool,
        default: Option<ValueId>,
        by_ref: bool,
    },
    ParameterMember {
        index: usize,
        member: ParameterMemberInner,
    },
    Const {
        value: ConstValue,
    },
    Undefined {
        kind: UndefinedKind,
    },
    BinOp {
        op: BinaryOp,
        x: ValueId,
        y: ValueId,
    },
    UnOp {
        op: UnaryOp,
        x: ValueId,
    },
    Call(Box<Call>),
    SideEffect {
        call_site: ValueId,
        value: ValueId,
    },
    Return {
        results: Vec<ValueId>,
    },
    Make {
        parent: Option<ValueId>,
        len: Option<ValueId>,
        cap: Option<ValueId>,
    },
    Next {
        iter: ValueId,
        in_next: bool,
    },
    Assert {
        cond: ValueId,
        msg: String,
        msg_value: Option<ValueId>,
    },
    TypeCast {
        value: ValueId,
    },
    TypeValue,
    ErrorHandler {
        try_block: BlockId,
        catches: Vec<BlockId>,
        finally: Option<BlockId>,
        done: Option<BlockId>,
    },
    Panic {
        info: ValueId,
    },
    Recover,
    Jump {
        to: BlockId,
    },
    If {
        cond: ValueId,
        true_block: BlockId,
        false_block: Option<BlockId>,
    },
    Loop {
        body: BlockId,
        exit: BlockId,
        init: Option<ValueId>,
        cond: Option<ValueId>,
        step: Option<ValueId>,
        key: Option<ValueId>,
    },
    Switch {
        cond: ValueId,
        default_block: Option<BlockId>,
        labels: Vec<SwitchLabel>,
    },
}

impl InstKind {
    pub fn opcode(&self) -> Opcode {
        match self {
            InstKind::Function(_) => Opcode::Function,
            InstKind::Block(_) => Opcode::BasicBlock,
            InstKind::Phi { .. } => Opcode::Phi,
            InstKind::Parameter { .. } => Opcode::Parameter,
            InstKind::ParameterMember { .. } => Opcode::ParameterMember,
            InstKind::Const { .. } => Opcode::Const,
            InstKind::Undefined { .. } => Opcode::Undefined,
            InstKind::BinOp { .. } => Opcode::BinOp,
            InstKind::UnOp { .. } => Opcode::UnOp,
            InstKind::Call(_) => Opcode::Call,
            InstKind::SideEffect { .. } => Opcode::SideEffect,
            InstKind::Return { .. } => Opcode::Return,
            InstKind::Make { .. } => Opcode::Make,
            InstKind::Next { .. } => Opcode::Next,
            InstKind::Assert { .. } => Opcode::Assert,
            InstKind::TypeCast { .. } => Opcode::TypeCast,
            InstKind::TypeValue => Opcode::TypeValue,
            InstKind::ErrorHandler { .. } => Opcode::ErrorHandler,
            InstKind::Panic { .. } => Opcode::Panic,
            InstKind::Recover => Opcode::Recover,
            InstKind::Jump { .. } => Opcode::Jump,
            InstKind::If { .. } => Opcode::If,
            InstKind::Loop { .. } => Opcode::Loop,
            InstKind::Switch { .. } => Opcode::Switch,
        }
    }

    /// Returns `true` for payloads that produce a value other instructions
    /// can consume.
    pub fn is_value(&self) -> bool {
        !matches!(
            self,
            InstKind::Jump { .. }
                | InstKind::If { .. }
                | InstKind::Loop { .. }
                | InstKind::Switch { .. }
                | InstKind::Assert { .. }
                | InstKind::ErrorHandler { .. }
        )
    }

    /// Returns `true` for the instructions that may end a block.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstKind::Jump { .. }
                | InstKind::If { .. }
                | InstKind::Loop { .. }
                | InstKind::Switch { .. }
                | InstKind::Return { .. }
                | InstKind::Panic { .. }
        )
    }

    /// Every value this instruction consumes, in slot order. Block targets
    /// are control edges, not operands, and are not included.
    pub fn operands(&self) -> Operands {
        let mut ops = Operands::new();
        match self {
            InstKind::Phi { edges, .. } => ops.extend(edges.iter().copied()),
            InstKind::BinOp { x, y, .. } => {
                ops.push(*x);
                ops.push(*y);
            }
            InstKind::UnOp { x, .. } => ops.push(*x),
            InstKind::Call(call) => {
                ops.push(call.method);
                ops.extend(call.args.iter().copied());
                ops.extend(call.binding.values().copied());
                ops.extend(call.arg_members.iter().copied());
            }
            InstKind::SideEffect { call_site, value } => {
                ops.push(*call_site);
                ops.push(*value);
            }
            InstKind::Return { results } => ops.extend(results.iter().copied()),
            InstKind::Make { parent, len, cap } => {
                ops.extend(parent.iter().chain(len).chain(cap).copied());
            }
            InstKind::Next { iter, .. } => ops.push(*iter),
            InstKind::Assert {
                cond, msg_value, ..
            } => {
                ops.push(*cond);
                ops.extend(msg_value.iter().copied());
            }
            InstKind::TypeCast { value } => ops.push(*value),
            InstKind::Panic { info } => ops.push(*info),
            InstKind::If { cond, .. } => ops.push(*cond),
            InstKind::Loop {
                init,
                cond,
                step,
                key,
                ..
            } => {
                ops.extend(init.iter().chain(cond).chain(step).chain(key).copied());
            }
            InstKind::Switch { cond, labels, .. } => {
                ops.push(*cond);
                ops.extend(labels.iter().map(|l| l.value));
            }
            InstKind::Function(_)
            | InstKind::Block(_)
            | InstKind::Parameter { .. }
            | InstKind::ParameterMember { .. }
            | InstKind::Const { .. }
            | InstKind::Undefined { .. }
            | InstKind::TypeValue
            | InstKind::ErrorHandler { .. }
            | InstKind::Recover
            | InstKind::Jump { .. } => {}
        }
        ops
    }

    /// Rewrites every operand slot holding `old` to `new`. Returns how many
    /// slots changed. Only the payload is touched; callers keep the users
    /// sets in sync.
    pub(crate) fn replace_operand(&mut self, old: ValueId, new: ValueId) -> usize {
        let mut count = 0;
        let mut swap = |slot: &mut ValueId| {
            if *slot == old {
                *slot = new;
                count += 1;
            }
        };
        match self {
            InstKind::Phi { edges, .. } => edges.iter_mut().for_each(&mut swap),
            InstKind::BinOp { x, y, .. } => {
                swap(x);
                swap(y);
            }
            InstKind::UnOp { x, .. } => swap(x),
            InstKind::Call(call) => {
                swap(&mut call.method);
                call.args.iter_mut().for_each(&mut swap);
                call.binding.values_mut().for_each(&mut swap);
                call.arg_members.iter_mut().for_each(&mut swap);
            }
            InstKind::SideEffect { call_site, value } => {
                swap(call_site);
                swap(value);
            }
            InstKind::Return { results } => results.iter_mut().for_each(&mut swap),
            InstKind::Make { parent, len, cap } => {
                parent
                    .iter_mut()
                    .chain(len.iter_mut())
                    .chain(cap.iter_mut())
                    .for_each(&mut swap);
            }
            InstKind::Next { iter, .. } => swap(iter),
            InstKind::Assert {
                cond, msg_value, ..
            } => {
                swap(cond);
                msg_value.iter_mut().for_each(&mut swap);
            }
            InstKind::TypeCast { value } => swap(value),
            InstKind::Panic { info } => swap(info),
            InstKind::If { cond, .. } => swap(cond),
            InstKind::Loop {
                init,
                cond,
                step,
                key,
                ..
            } => {
                init.iter_mut()
                    .chain(cond.iter_mut())
                    .chain(step.iter_mut())
                    .chain(key.iter_mut())
                    .for_each(&mut swap);
            }
            InstKind::Switch { cond, labels, .. } => {
                swap(cond);
                labels.iter_mut().for_each(|l| swap(&mut l.value));
            }
            _ => {}
        }
        count
    }

    /// Control-flow successors named by a payload. Terminators name their
    /// branch targets; an `ErrorHandler` names its catch blocks.
    pub fn block_targets(&self) -> SmallVec<[BlockId; 2]> {
        let mut targets = SmallVec::new();
        match self {
            InstKind::Jump { to } => targets.push(*to),
            InstKind::If {
                true_block,
                false_block,
                ..
            } => {
                targets.push(*true_block);
                targets.extend(false_block.iter().copied());
            }
            InstKind::Loop { body, exit, .. } => {
                targets.push(*body);
                targets.push(*exit);
            }
            InstKind::Switch {
                default_block,
                labels,
                ..
            } => {
                targets.extend(labels.iter().map(|l| l.dest));
                targets.extend(default_block.iter().copied());
            }
            // Exceptional edges into the catch blocks.
            InstKind::ErrorHandler { catches, .. } => targets.extend(catches.iter().copied()),
            _ => {}
        }
        targets
    }
}

/// The object/key pair of a value that is itself a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberOf {
    pub object: ValueId,
    pub key: ValueId,
}

/// One arena entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub id: ValueId,
    pub name: String,
    pub verbose_name: String,
    pub function: Option<FunctionId>,
    pub block: Option<BlockId>,
    pub range: Option<Range>,
    pub ty: Option<SsaType>,
    pub kind: InstKind,

    pub(crate) users: IndexSet<ValueId>,
    pub(crate) masks: IndexSet<ValueId>,
    pub(crate) references: IndexSet<ValueId>,
    /// Member key -> member value. Keys are values (possibly computed).
    pub(crate) members: IndexMap<ValueId, ValueId>,
    pub(crate) member_of: Option<MemberOf>,
    /// Variable names currently bound to this value.
    pub(crate) variables: IndexSet<String>,
}

impl Instruction {
    pub fn new(id: ValueId, kind: InstKind) -> Self {
        Instruction {
            id,
            name: String::new(),
            verbose_name: String::new(),
            function: None,
            block: None,
            range: None,
            ty: None,
            kind,
            users: IndexSet::new(),
            masks: IndexSet::new(),
            references: IndexSet::new(),
            members: IndexMap::new(),
            member_of: None,
            variables: IndexSet::new(),
        }
    }

    pub fn opcode(&self) -> Opcode {
        self.kind.opcode()
    }

    pub fn users(&self) -> &IndexSet<ValueId> {
        &self.users
    }

    pub fn has_users(&self) -> bool {
        !self.users.is_empty()
    }

    pub fn operands(&self) -> Operands {
        self.kind.operands()
    }

    pub fn masks(&self) -> &IndexSet<ValueId> {
        &self.masks
    }

    pub fn is_masked(&self) -> bool {
        !self.masks.is_empty()
    }

    pub fn references(&self) -> &IndexSet<ValueId> {
        &self.references
    }

    /// `true` if this value has at least one member (acts as an object).
    pub fn is_object(&self) -> bool {
        !self.members.is_empty()
    }

    /// `true` if this value is a member of some object.
    pub fn is_member(&self) -> bool {
        self.member_of.is_some()
    }

    pub fn member_of(&self) -> Option<MemberOf> {
        self.member_of
    }

    pub fn object(&self) -> Option<ValueId> {
        self.member_of.map(|m| m.object)
    }

    pub fn key(&self) -> Option<ValueId> {
        self.member_of.map(|m| m.key)
    }

    pub fn variables(&self) -> &IndexSet<String> {
        &self.variables
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self.kind, InstKind::Undefined { .. })
    }

    pub fn const_value(&self) -> Option<&ConstValue> {
        match &self.kind {
            InstKind::Const { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn as_call(&self) -> Option<&Call> {
        match &self.kind {
            InstKind::Call(call) => Some(call),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match &self.kind {
            InstKind::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<&BasicBlock> {
        match &self.kind {
            InstKind::Block(b) => Some(b),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_operands_include_bindings_and_arg_members() {
        let mut call = Call::new(ValueId(1), vec![ValueId(2), ValueId(3)]);
        call.binding.insert("x".into(), ValueId(4));
        call.arg_members.push(ValueId(5));
        let kind = InstKind::Call(Box::new(call));
        assert_eq!(
            kind.operands().as_slice(),
            &[ValueId(1), ValueId(2), ValueId(3), ValueId(4), ValueId(5)]
        );
    }

    #[test]
    fn replace_operand_counts_every_slot() {
        let mut kind = InstKind::Phi {
            edges: vec![ValueId(1), ValueId(2), ValueId(1)],
        };
        assert_eq!(kind.replace_operand(ValueId(1), ValueId(9)), 2);
        assert_eq!(kind.operands().as_slice(), &[ValueId(9), ValueId(2), ValueId(9)]);
    }

    #[test]
    fn branch_targets_are_not_operands() {
        let kind = InstKind::If {
            cond: ValueId(1),
            true_block: BlockId(2),
            false_block: Some(BlockId(3)),
        };
        assert_eq!(kind.operands().as_slice(), &[ValueId(1)]);
        assert_eq!(kind.block_targets().as_slice(), &[BlockId(2), BlockId(3)]);
        assert!(kind.is_terminator());
        assert!(!kind.is_value());
    }

    #[test]
    fn parameter_member_resolution() {
        let mut call = Call::new(ValueId(1), vec![ValueId(10)]);
        call.binding.insert("captured".into(), ValueId(20));

        let by_index = ParameterMemberInner {
            object_name: "a".into(),
            kind: MemberCallKind::Parameter { index: 0 },
            key: ValueId(99),
        };
        assert_eq!(by_index.resolve(&call), Some(ValueId(10)));

        let out_of_range = ParameterMemberInner {
            kind: MemberCallKind::Parameter { index: 3 },
            ..by_index.clone()
        };
        assert_eq!(out_of_range.resolve(&call), None);

        let by_name = ParameterMemberInner {
            object_name: "captured".into(),
            kind: MemberCallKind::FreeValue {
                name: "captured".into(),
            },
            key: ValueId(99),
        };
        assert_eq!(by_name.resolve(&call), Some(ValueId(20)));

        let missing = ParameterMemberInner {
            kind: MemberCallKind::FreeValue {
                name: "other".into(),
            },
            ..by_name
        };
        assert_eq!(missing.resolve(&call), None);
    }
}
