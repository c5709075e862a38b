//! Builder protocol scenarios.
//!
//! Tests cover:
//! - Phi completeness over random nested if/loop bodies
//! - `else if` chains and their siblings
//! - Closure free values and call-site bindings
//! - Closure and parameter-member side effects replayed at call sites
//! - Parameter members resolved against call arguments

use proptest::prelude::*;

use ssaflow_build::{BuildError, Builder, IfBuilder, LoopBuilder};
use ssaflow_core::{
    ConstValue, FunctionId, InstKind, MemberCallKind, Program, UnaryOp, ValueId,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const VARS: [&str; 3] = ["x", "y", "z"];

#[derive(Debug, Clone)]
enum Stmt {
    Assign(u8, i64),
    Read(u8),
    Break,
    If {
        branches: Vec<Vec<Stmt>>,
        otherwise: Option<Vec<Stmt>>,
    },
    Loop(Vec<Stmt>),
}

fn stmt() -> impl Strategy<Value = Stmt> {
    let leaf = prop_oneof![
        (0u8..3, any::<i8>()).prop_map(|(v, n)| Stmt::Assign(v, n as i64)),
        (0u8..3).prop_map(Stmt::Read),
        Just(Stmt::Break),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            (
                prop::collection::vec(prop::collection::vec(inner.clone(), 0..3), 1..4),
                prop::option::of(prop::collection::vec(inner.clone(), 0..3)),
            )
                .prop_map(|(branches, otherwise)| Stmt::If { branches, otherwise }),
            prop::collection::vec(inner, 0..4).prop_map(Stmt::Loop),
        ]
    })
}

fn run(b: &mut Builder<'_>, stmts: &[Stmt], in_loop: bool) -> Result<(), BuildError> {
    for s in stmts {
        match s {
            Stmt::Assign(v, n) => {
                let c = b.const_value(*n)?;
                b.assign_variable(VARS[*v as usize], c)?;
            }
            Stmt::Read(v) => {
                let x = b.read_variable(VARS[*v as usize])?;
                b.emit_unop(UnaryOp::Neg, x)?;
            }
            Stmt::Break => {
                if in_loop {
                    b.break_loop()?;
                }
            }
            Stmt::If { branches, otherwise } => {
                let mut chain = IfBuilder::new();
                for body in branches.iter().cloned() {
                    chain = chain.branch(|b| b.read_variable("c"), move |b| run(b, &body, in_loop));
                }
                if let Some(body) = otherwise.clone() {
                    chain = chain.otherwise(move |b| run(b, &body, in_loop));
                }
                chain.build(b)?;
            }
            Stmt::Loop(body) => {
                let body = body.clone();
                LoopBuilder::new()
                    .condition(|b| b.read_variable("c"))
                    .body(move |b| run(b, &body, true))
                    .build(b)?;
            }
        }
    }
    Ok(())
}

fn const_of(p: &Program, id: ValueId) -> Option<ConstValue> {
    p.get(id).ok()?.const_value().cloned()
}

fn start(b: &mut Builder<'_>, name: &str, params: &[&str]) -> FunctionId {
    let f = b.start_function(name).unwrap();
    for p in params {
        b.declare_parameter(p).unwrap();
    }
    f
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn phis_match_predecessors(body in prop::collection::vec(stmt(), 1..8)) {
        let mut program = Program::new("prop");
        let mut b = Builder::new(&mut program, "main");
        let f = start(&mut b, "main", &["c"]);
        for v in VARS {
            let zero = b.const_value(0).unwrap();
            b.assign_variable(v, zero).unwrap();
        }
        run(&mut b, &body, false).unwrap();
        for v in VARS {
            b.read_variable(v).unwrap();
        }
        b.finish_function().unwrap();

        let func = program.function(f).unwrap();
        prop_assert!(func.is_finished());
        for block_id in &func.blocks {
            let block = program.block(*block_id).unwrap();
            prop_assert!(block.is_finished());
            for phi in block.phis() {
                let InstKind::Phi { edges, .. } = &program.get(*phi).unwrap().kind else {
                    panic!("non-phi in phi list");
                };
                prop_assert_eq!(edges.len(), block.preds.len());
                prop_assert!(block.preds.len() > 1);
            }
        }
        program.verify_use_def().unwrap();
    }
}

// ---------------------------------------------------------------------------
// If chains
// ---------------------------------------------------------------------------

fn if_chain(branches: usize, with_else: bool) -> (Program, Vec<ValueId>, ssaflow_core::BlockId) {
    let mut program = Program::new("if");
    let mut b = Builder::new(&mut program, "main");
    start(&mut b, "main", &["c"]);
    let entry = b.current_block().unwrap();
    let mut chain = IfBuilder::new();
    for i in 0..branches {
        chain = chain.branch(
            |b| b.read_variable("c"),
            move |b| {
                let v = b.const_value(i as i64)?;
                b.assign_variable("r", v)
            },
        );
    }
    if with_else {
        chain = chain.otherwise(|b| {
            let v = b.const_value(-1)?;
            b.assign_variable("r", v)
        });
    }
    let ifs = chain.build(&mut b).unwrap();
    let r = b.read_variable("r").unwrap();
    b.emit_return(vec![r]).unwrap();
    b.finish_function().unwrap();
    (program, ifs, entry)
}

#[test]
fn if_elif_else_compiles_to_two_linked_ifs() {
    let (program, ifs, entry) = if_chain(2, true);
    assert_eq!(ifs.len(), 2);

    let InstKind::If { false_block: Some(false_block), .. } = program.get(ifs[0]).unwrap().kind else {
        panic!("first instruction is not an if");
    };
    assert_eq!(program.block(false_block).unwrap().last_inst(), Some(ifs[1]));
    assert_eq!(program.if_siblings(ifs[0]), vec![ifs[1]]);
    assert_eq!(program.cfg_entry_instructions(entry), Some(ifs.clone()));

    // The merge sees three incoming paths.
    let r_phi = program
        .ids()
        .find(|id| {
            program
                .get(*id)
                .is_ok_and(|i| i.name == "r" && matches!(&i.kind, InstKind::Phi { edges, .. } if edges.len() == 3))
        });
    assert!(r_phi.is_some());
}

#[test]
fn longer_chain_lists_every_sibling_in_order() {
    let (program, ifs, entry) = if_chain(4, false);
    assert_eq!(ifs.len(), 4);
    assert_eq!(program.if_siblings(ifs[0]), ifs[1..].to_vec());
    assert_eq!(program.if_siblings(ifs[2]), vec![ifs[3]]);
    assert!(program.if_siblings(ifs[3]).is_empty());
    assert_eq!(program.cfg_entry_instructions(entry).unwrap().len(), 4);
}

/// `x = 0` followed by `count` sequential ifs; `assign` makes each then-branch
/// write `x`.
fn sequential_ifs(count: usize, assign: bool) -> (Program, ValueId, ValueId) {
    let mut program = Program::new("ifs");
    let mut b = Builder::new(&mut program, "main");
    start(&mut b, "main", &["c"]);
    let zero = b.const_value(0).unwrap();
    b.assign_variable("x", zero).unwrap();
    for i in 0..count {
        IfBuilder::new()
            .branch(
                |b| b.read_variable("c"),
                move |b| {
                    if assign {
                        let v = b.const_value(i as i64)?;
                        b.assign_variable("x", v)?;
                    }
                    Ok(())
                },
            )
            .build(&mut b)
            .unwrap();
    }
    let x = b.read_variable("x").unwrap();
    b.finish_function().unwrap();
    (program, zero, x)
}

#[test]
fn read_after_many_merges_without_writes_finds_the_original() {
    let (program, zero, x) = sequential_ifs(5_000, false);
    assert_eq!(x, zero);
    assert!(program
        .ids()
        .all(|id| !matches!(program.get(id).unwrap().kind, InstKind::Phi { .. })));
    program.verify_use_def().unwrap();
}

#[test]
fn read_after_many_assigning_merges_places_a_phi_per_merge() {
    let count = 2_000;
    let (program, zero, x) = sequential_ifs(count, true);
    let phis: Vec<ValueId> = program
        .ids()
        .filter(|id| matches!(program.get(*id).unwrap().kind, InstKind::Phi { .. }))
        .collect();
    assert_eq!(phis.len(), count);
    assert!(phis.contains(&x));

    // Each merge is entered from the condition block first, then from the
    // branch. Walking the condition edges leads back to the first definition.
    let mut current = x;
    for _ in 0..count {
        let InstKind::Phi { edges, .. } = &program.get(current).unwrap().kind else {
            panic!("expected a phi");
        };
        assert_eq!(edges.len(), 2);
        assert!(const_of(&program, edges[1]).is_some());
        current = edges[0];
    }
    assert_eq!(current, zero);
    program.verify_use_def().unwrap();
}

// ---------------------------------------------------------------------------
// Closures
// ---------------------------------------------------------------------------

#[test]
fn closure_reads_become_free_values_bound_at_call() {
    let mut program = Program::new("closure");
    let mut b = Builder::new(&mut program, "main");
    start(&mut b, "main", &[]);
    let one = b.const_value(1).unwrap();
    b.assign_variable("x", one).unwrap();

    let f = start(&mut b, "f", &[]);
    let x = b.read_variable("x").unwrap();
    b.emit_return(vec![x]).unwrap();
    b.finish_function().unwrap();

    b.assign_variable("f", f.into()).unwrap();
    let callee = b.read_variable("f").unwrap();
    let call_id = b.emit_call(callee, vec![]).unwrap();
    b.finish_function().unwrap();

    let func = program.function(f).unwrap();
    assert!(func.is_closure());
    let fv = func.free_values["x"];
    assert_eq!(x, fv);
    assert!(matches!(
        program.get(fv).unwrap().kind,
        InstKind::Parameter { is_free_value: true, .. }
    ));
    assert_eq!(callee, ValueId::from(f));
    let call = program.get(call_id).unwrap().as_call().unwrap();
    assert_eq!(call.binding.get("x"), Some(&one));
    assert!(program.get(callee).unwrap().users().contains(&call_id));
}

#[test]
fn nested_closure_captures_through_parent() {
    let mut program = Program::new("closure");
    let mut b = Builder::new(&mut program, "main");
    start(&mut b, "main", &[]);
    let v = b.const_value("secret").unwrap();
    b.assign_variable("s", v).unwrap();
    let outer = start(&mut b, "outer", &[]);
    let inner = start(&mut b, "inner", &[]);
    let s = b.read_variable("s").unwrap();
    b.emit_return(vec![s]).unwrap();
    b.finish_function().unwrap();
    b.finish_function().unwrap();
    b.finish_function().unwrap();

    assert!(program.function(inner).unwrap().free_values.contains_key("s"));
    // The enclosing closure captures it too, to pass it on.
    assert!(program.function(outer).unwrap().free_values.contains_key("s"));
    assert_eq!(program.function(inner).unwrap().parent, Some(outer));
}

#[test]
fn closure_assignment_replays_as_side_effect() {
    // a = 1; b = () => { a = 2 }; b(); c = a
    let mut program = Program::new("side-effect");
    let mut b = Builder::new(&mut program, "main");
    start(&mut b, "main", &[]);
    let one = b.const_value(1).unwrap();
    b.assign_variable("a", one).unwrap();

    let closure = start(&mut b, "b", &[]);
    let two = b.const_value(2).unwrap();
    b.assign_variable("a", two).unwrap();
    b.finish_function().unwrap();
    b.assign_variable("b", closure.into()).unwrap();

    let callee = b.read_variable("b").unwrap();
    let call = b.emit_call(callee, vec![]).unwrap();
    let a = b.read_variable("a").unwrap();
    b.assign_variable("c", a).unwrap();
    b.finish_function().unwrap();

    let effects = &program.function(closure).unwrap().side_effects;
    assert_eq!(effects.len(), 1);
    assert_eq!(effects[0].name, "a");
    assert_eq!(effects[0].modify, two);

    let inst = program.get(a).unwrap();
    match inst.kind {
        InstKind::SideEffect { call_site, value } => {
            assert_eq!(call_site, call);
            assert_eq!(value, two);
        }
        ref other => panic!("c is not defined by a side effect: {:?}", other.opcode()),
    }
    assert!(inst.variables().contains("c"));
    assert!(inst.masks().contains(&one));
    assert_eq!(const_of(&program, one), Some(ConstValue::Int(1)));
}

#[test]
fn local_assignment_in_closure_is_not_a_side_effect() {
    let mut program = Program::new("local");
    let mut b = Builder::new(&mut program, "main");
    start(&mut b, "main", &[]);
    let f = start(&mut b, "f", &[]);
    let v = b.const_value(3).unwrap();
    b.assign_variable("tmp", v).unwrap();
    b.finish_function().unwrap();
    b.finish_function().unwrap();
    assert!(!program.function(f).unwrap().has_side_effects());
}

// ---------------------------------------------------------------------------
// Members through parameters
// ---------------------------------------------------------------------------

#[test]
fn parameter_member_write_is_replayed_on_argument() {
    // set(o) { o.name = "bob" }; obj = {}; set(obj)
    let mut program = Program::new("members");
    let mut b = Builder::new(&mut program, "main");
    let set = start(&mut b, "set", &["o"]);
    let o = b.read_variable("o").unwrap();
    let bob = b.const_value("bob").unwrap();
    b.assign_member_by_name(o, "name", bob).unwrap();
    b.finish_function().unwrap();

    start(&mut b, "main", &[]);
    let obj = b.emit_make(None).unwrap();
    b.assign_variable("obj", obj).unwrap();
    let callee = b.read_variable("set").unwrap();
    assert_eq!(callee, ValueId::from(set));
    let call = b.emit_call(callee, vec![obj]).unwrap();
    b.finish_function().unwrap();

    let effect = &program.function(set).unwrap().side_effects[0];
    let inner = effect.member.as_ref().unwrap();
    assert_eq!(inner.kind, MemberCallKind::Parameter { index: 0 });

    let name = program.get_string_member(obj, "name").unwrap();
    match program.get(name).unwrap().kind {
        InstKind::SideEffect { call_site, value } => {
            assert_eq!(call_site, call);
            assert_eq!(value, bob);
        }
        ref other => panic!("member is not a side effect: {:?}", other.opcode()),
    }
}

#[test]
fn parameter_member_read_resolves_at_call_site() {
    // f(a) { return a.user }; obj.user = "alice"; f(obj)
    let mut program = Program::new("members");
    let mut b = Builder::new(&mut program, "main");
    let f = start(&mut b, "f", &["a"]);
    let a = b.read_variable("a").unwrap();
    let user = b.read_member_by_name(a, "user").unwrap();
    b.emit_return(vec![user]).unwrap();
    b.finish_function().unwrap();

    start(&mut b, "main", &[]);
    let obj = b.emit_make(None).unwrap();
    let alice = b.const_value("alice").unwrap();
    b.assign_member_by_name(obj, "user", alice).unwrap();
    let callee = b.read_variable("f").unwrap();
    let call = b.emit_call(callee, vec![obj]).unwrap();
    b.finish_function().unwrap();

    let func = program.function(f).unwrap();
    assert_eq!(func.parameter_members, vec![user]);
    let InstKind::ParameterMember { member, .. } = &program.get(user).unwrap().kind else {
        panic!("a.user is not a parameter member");
    };
    assert_eq!(member.object_name, "a");

    let call = program.get(call).unwrap().as_call().unwrap();
    assert_eq!(call.arg_members, vec![alice]);
    assert_eq!(member.resolve(call), Some(obj));
    assert!(program.errors().is_empty());
}

#[test]
fn missing_member_of_plain_object_is_reported() {
    let mut program = Program::new("members");
    let mut b = Builder::new(&mut program, "main");
    start(&mut b, "main", &[]);
    let obj = b.emit_make(None).unwrap();
    let m = b.read_member_by_name(obj, "nope").unwrap();
    assert_eq!(b.read_member_by_name(obj, "nope").unwrap(), m);
    b.finish_function().unwrap();

    assert!(program.get(m).unwrap().is_undefined());
    assert_eq!(program.get(m).unwrap().object(), Some(obj));
    assert_eq!(program.errors().len(), 1);
}
