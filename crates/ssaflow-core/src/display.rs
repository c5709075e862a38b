//! Human-readable rendering of instructions and functions.

use std::fmt::Write as _;

use crate::error::CoreError;
use crate::id::{FunctionId, ValueId};
use crate::inst::{InstKind, Instruction};
use crate::program::Program;
use crate::types::ConstValue;

fn join(ids: &[ValueId]) -> String {
    ids.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ")
}

fn literal(value: &ConstValue) -> String {
    match value {
        ConstValue::Str(s) => format!("{:?}", s),
        other => other.to_string(),
    }
}

impl Program {
    /// One-line text of an instruction, e.g. `t7 = t5 + t6`.
    pub fn display_value(&self, id: ValueId) -> String {
        match self.get(id) {
            Ok(inst) => self.render(inst),
            Err(err) => format!("<{}>", err),
        }
    }

    fn render(&self, inst: &Instruction) -> String {
        let id = inst.id;
        match &inst.kind {
            InstKind::Function(_) => format!("{} = func {}", id, inst.name),
            InstKind::Block(_) => format!("{} = block {}", id, inst.name),
            InstKind::Phi { edges, .. } => {
                let preds = inst
                    .block
                    .and_then(|b| self.block(b).ok())
                    .map(|b| b.preds.clone())
                    .unwrap_or_default();
                let arms: Vec<String> = edges
                    .iter()
                    .enumerate()
                    .map(|(i, v)| match preds.get(i) {
                        Some(p) => format!("[{}, {}]", v, p),
                        None => format!("[{}, ?]", v),
                    })
                    .collect();
                format!("{} = phi({}) {}", id, inst.name, arms.join(" "))
            }
            InstKind::Parameter { is_free_value, .. } => {
                let what = if *is_free_value { "freevalue" } else { "param" };
                format!("{} = {} {}", id, what, inst.name)
            }
            InstKind::ParameterMember { member, .. } => {
                let key = self
                    .lookup(member.key)
                    .and_then(|k| k.const_value().map(ToString::to_string))
                    .unwrap_or_else(|| member.key.to_string());
                format!("{} = parameter-member {}.{}", id, member.object_name, key)
            }
            InstKind::Const { value, .. } => format!("{} = const {}", id, literal(value)),
            InstKind::Undefined { kind } => format!("{} = undefined({:?}) {}", id, kind, inst.name),
            InstKind::BinOp { op, x, y } => format!("{} = {} {} {}", id, x, op.symbol(), y),
            InstKind::UnOp { op, x } => format!("{} = {}{}", id, op.symbol(), x),
            InstKind::Call(call) => {
                let mut s = format!("{} = call {}({})", id, call.method, join(&call.args));
                if !call.binding.is_empty() {
                    let binds: Vec<String> = call
                        .binding
                        .iter()
                        .map(|(name, v)| format!("{}: {}", name, v))
                        .collect();
                    let _ = write!(s, " binding [{}]", binds.join(", "));
                }
                if !call.arg_members.is_empty() {
                    let _ = write!(s, " members [{}]", join(&call.arg_members));
                }
                s
            }
            InstKind::SideEffect { call_site, value } => {
                format!("{} = side-effect {} by {} = {}", id, inst.name, call_site, value)
            }
            InstKind::Return { results } => format!("ret {}", join(results)),
            InstKind::Make { parent, len, cap } => {
                let opt = |v: &Option<ValueId>| v.map(|v| v.to_string()).unwrap_or_default();
                format!("{} = make({}, {}, {})", id, opt(parent), opt(len), opt(cap))
            }
            InstKind::Next { iter, in_next } => {
                format!("{} = next {}{}", id, iter, if *in_next { " in" } else { "" })
            }
            InstKind::Assert { cond, msg, .. } => format!("assert {}, {:?}", cond, msg),
            InstKind::TypeCast { value } => match &inst.ty {
                Some(ty) => format!("{} = cast {} to {}", id, value, ty),
                None => format!("{} = cast {}", id, value),
            },
            InstKind::TypeValue => match &inst.ty {
                Some(ty) => format!("{} = type {}", id, ty),
                None => format!("{} = type", id),
            },
            InstKind::ErrorHandler {
                try_block,
                catches,
                finally,
                done,
            } => {
                let catches: Vec<String> = catches.iter().map(ToString::to_string).collect();
                let mut s = format!("error-handler try {} catch [{}]", try_block, catches.join(", "));
                if let Some(f) = finally {
                    let _ = write!(s, " finally {}", f);
                }
                if let Some(d) = done {
                    let _ = write!(s, " done {}", d);
                }
                s
            }
            InstKind::Panic { info } => format!("panic {}", info),
            InstKind::Recover => format!("{} = recover", id),
            InstKind::Jump { to } => format!("jump {}", to),
            InstKind::If {
                cond,
                true_block,
                false_block,
            } => match false_block {
                Some(f) => format!("if {} -> {}, {}", cond, true_block, f),
                None => format!("if {} -> {}", cond, true_block),
            },
            InstKind::Loop {
                body, exit, cond, ..
            } => match cond {
                Some(c) => format!("loop {} -> {}, {}", c, body, exit),
                None => format!("loop -> {}, {}", body, exit),
            },
            InstKind::Switch {
                cond,
                default_block,
                labels,
            } => {
                let labels: Vec<String> = labels
                    .iter()
                    .map(|l| format!("{}: {}", l.value, l.dest))
                    .collect();
                let default = default_block
                    .map(|d| format!(" default {}", d))
                    .unwrap_or_default();
                format!("switch {}{} {{{}}}", cond, default, labels.join(", "))
            }
        }
    }

    /// Multi-line listing of a function: signature, then each block with
    /// its predecessors, phis and instructions.
    pub fn dump_function(&self, func: FunctionId) -> Result<String, CoreError> {
        let f = self.function(func)?;
        let name = &self.get(func.into())?.name;
        let params: Vec<String> = f
            .params
            .iter()
            .map(|p| self.get(*p).map(|i| i.name.clone()))
            .collect::<Result<_, _>>()?;
        let mut out = format!("{} {}({})\n", func, name, params.join(", "));
        if !f.free_values.is_empty() {
            let names: Vec<&str> = f.free_values.keys().map(String::as_str).collect();
            let _ = writeln!(out, "freevalues: {}", names.join(", "));
        }
        for block in &f.blocks {
            let b = self.block(*block)?;
            let block_name = &self.get((*block).into())?.name;
            let preds: Vec<String> = b.preds.iter().map(ToString::to_string).collect();
            let _ = writeln!(out, "{} {}: <- [{}]", block, block_name, preds.join(", "));
            for id in b.phis().iter().chain(b.insts()) {
                let _ = writeln!(out, "  {}", self.display_value(*id));
            }
        }
        Ok(out)
    }
}
