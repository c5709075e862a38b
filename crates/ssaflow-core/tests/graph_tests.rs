//! Integration tests for the arena graph model.
//!
//! Tests cover:
//! - Use-def symmetry under random construction, rewriting and deletion
//! - If-sibling termination on a cyclic elif chain
//! - Function listing snapshot
//! - Lazy reload through a `NodeLoader`

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use proptest::prelude::*;

use ssaflow_core::{
    BinaryOp, BlockId, CoreError, FunctionId, InstKind, Instruction, NodeLoader, Program, ValueId,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn main_function(p: &mut Program) -> (FunctionId, BlockId) {
    let f = p.new_function("main", "main", None).unwrap();
    let entry = p.function(f).unwrap().enter_block.unwrap();
    (f, entry)
}

#[derive(Debug, Clone)]
enum Edit {
    Const,
    BinOp(u16, u16),
    Replace(u16, u16, u16),
    Delete(u16),
}

fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        Just(Edit::Const),
        (any::<u16>(), any::<u16>()).prop_map(|(x, y)| Edit::BinOp(x, y)),
        (any::<u16>(), any::<u16>(), any::<u16>()).prop_map(|(u, o, n)| Edit::Replace(u, o, n)),
        any::<u16>().prop_map(Edit::Delete),
    ]
}

fn pick(pool: &[ValueId], i: u16) -> Option<ValueId> {
    if pool.is_empty() {
        None
    } else {
        Some(pool[i as usize % pool.len()])
    }
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn use_def_edges_stay_symmetric(edits in prop::collection::vec(edit(), 1..80)) {
        let mut p = Program::new("prop");
        let (f, entry) = main_function(&mut p);
        let mut values = vec![p.new_const(Some(f), 0)];
        let mut binops: Vec<ValueId> = Vec::new();

        for e in edits {
            match e {
                Edit::Const => values.push(p.new_const(Some(f), values.len() as i64)),
                Edit::BinOp(x, y) => {
                    let (x, y) = (pick(&values, x).unwrap(), pick(&values, y).unwrap());
                    let id = p.emit(entry, InstKind::BinOp { op: BinaryOp::Add, x, y }).unwrap();
                    values.push(id);
                    binops.push(id);
                }
                Edit::Replace(u, o, n) => {
                    if let Some(user) = pick(&binops, u) {
                        let ops = p.get(user).unwrap().operands();
                        let old = ops[o as usize % ops.len()];
                        let new = pick(&values, n).unwrap();
                        if new != user {
                            p.replace_value(user, old, new).unwrap();
                        }
                    }
                }
                Edit::Delete(d) => {
                    if let Some(victim) = pick(&binops, d) {
                        p.self_delete(victim).unwrap();
                        binops.retain(|v| *v != victim);
                        values.retain(|v| *v != victim);
                    }
                }
            }
        }

        prop_assert!(p.verify_use_def().is_ok());
        for v in &values {
            for user in p.get(*v).unwrap().users() {
                prop_assert!(p.get(*user).unwrap().operands().contains(v));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Control flow
// ---------------------------------------------------------------------------

#[test]
fn cyclic_if_chain_terminates() {
    let mut p = Program::new("cycle");
    let (f, entry) = main_function(&mut p);
    let c = p.new_const(Some(f), true);
    let head = p.new_block(f, "if.cond").unwrap();
    let elif = p.new_block(f, "if.elif").unwrap();
    let body = p.new_block(f, "if.true").unwrap();

    p.emit(entry, InstKind::Jump { to: head }).unwrap();
    let if1 = p
        .emit(
            head,
            InstKind::If {
                cond: c,
                true_block: body,
                false_block: Some(elif),
            },
        )
        .unwrap();
    // The elif's false edge points back at the first condition block.
    let if2 = p
        .emit(
            elif,
            InstKind::If {
                cond: c,
                true_block: body,
                false_block: Some(head),
            },
        )
        .unwrap();

    assert_eq!(p.if_siblings(if1), vec![if2]);
    assert_eq!(p.if_siblings(if2), vec![if1]);
    assert_eq!(p.cfg_entry_instructions(entry), Some(vec![if1, if2]));
}

#[test]
fn dump_function_listing() {
    let mut p = Program::new("demo");
    let f = p.new_function("main", "add", None).unwrap();
    let entry = p.function(f).unwrap().enter_block.unwrap();
    let a = p.new_parameter(f, "a").unwrap();
    let b = p.new_parameter(f, "b").unwrap();
    let sum = p
        .emit(
            entry,
            InstKind::BinOp {
                op: BinaryOp::Add,
                x: a,
                y: b,
            },
        )
        .unwrap();
    p.emit(entry, InstKind::Return { results: vec![sum] }).unwrap();

    let dump = p.dump_function(f).unwrap();
    insta::assert_snapshot!(dump.trim_end(), @r"
f0 add(a, b)
b1 entry-0: <- []
  t4 = t2 + t3
  ret t4
");
}

// ---------------------------------------------------------------------------
// Lazy reload
// ---------------------------------------------------------------------------

struct MapLoader {
    nodes: HashMap<ValueId, Instruction>,
    loads: AtomicUsize,
}

impl NodeLoader for MapLoader {
    fn load_node(&self, _program: &str, id: ValueId) -> Result<Instruction, CoreError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.nodes
            .get(&id)
            .cloned()
            .ok_or(CoreError::ValueNotFound { id })
    }
}

#[test]
fn lazy_program_materializes_on_demand() {
    let mut p = Program::new("lazy");
    let (f, entry) = main_function(&mut p);
    let c = p.new_const(Some(f), "alice");
    p.emit(entry, InstKind::Return { results: vec![c] }).unwrap();

    let nodes = p.nodes().unwrap();
    let ids: Vec<ValueId> = nodes.iter().map(|n| n.id).collect();
    let loader = Arc::new(MapLoader {
        nodes: nodes.into_iter().map(|n| (n.id, n)).collect(),
        loads: AtomicUsize::new(0),
    });
    let lazy = Program::lazy(p.parts(), &ids, loader.clone());

    assert!(lazy.is_pending(c));
    assert_eq!(loader.loads.load(Ordering::SeqCst), 0);
    assert_eq!(lazy.get(c).unwrap().const_value().unwrap().to_string(), "alice");
    assert_eq!(lazy.get(c).unwrap().id, c);
    assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    assert!(!lazy.is_pending(c));

    let returns = &lazy.function(f).unwrap().returns;
    assert_eq!(returns.len(), 1);
    assert_eq!(lazy.get(returns[0]).unwrap().operands().as_slice(), &[c]);
}
