//! Snapshots, lazy reload and the source index, across both backends.

use std::sync::Arc;

use ssaflow_build::{
    BuildError, Builder, FileOutcome, FrontendRegistry, Language, LanguageFrontend, MemoryFs,
    ParseConfig, ProjectBuilder,
};
use ssaflow_core::{Program, SourceEditor, ValueId};
use ssaflow_query::{Matcher, Query, SearchMode, TraceOptions, ValueHandle, ValueOperator};
use ssaflow_storage::{load_lazy, GraphStore, InMemoryStore, SqliteStore, StorageError};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Fixture {
    program: Program,
    call: ValueId,
    alice: ValueId,
}

/// `f(a) { return a.user }; obj.user = "alice"; f(obj)`
fn alice(name: &str) -> Fixture {
    let mut program = Program::new(name);
    let mut b = Builder::new(&mut program, "main");
    b.start_function("f").unwrap();
    b.declare_parameter("a").unwrap();
    let a = b.read_variable("a").unwrap();
    let user = b.read_member_by_name(a, "user").unwrap();
    b.emit_return(vec![user]).unwrap();
    b.finish_function().unwrap();

    b.start_function("main").unwrap();
    let obj = b.emit_make(None).unwrap();
    let alice = b.const_value("alice").unwrap();
    b.assign_member_by_name(obj, "user", alice).unwrap();
    let f = b.read_variable("f").unwrap();
    let call = b.emit_call(f, vec![obj]).unwrap();
    b.finish_function().unwrap();
    Fixture {
        program,
        call,
        alice,
    }
}

fn top_defs(program: &Program, id: ValueId) -> Vec<ValueId> {
    let query = Query::new().with_program(program);
    let start = ValueOperator::Value(ValueHandle::new(program.name(), id));
    query
        .top_defs(&start, &TraceOptions::default())
        .unwrap()
        .into_iter()
        .map(|h| h.id)
        .collect()
}

// ---------------------------------------------------------------------------
// Lazy reload
// ---------------------------------------------------------------------------

#[test]
fn lazy_program_loads_only_what_a_trace_touches() {
    let fx = alice("lazy");
    let store = Arc::new(InMemoryStore::new());
    store.save_program(&fx.program).unwrap();

    let lazy = load_lazy(store.clone(), "lazy").unwrap();
    assert_eq!(lazy.len(), fx.program.len());
    assert!(lazy.is_pending(fx.call));
    assert_eq!(store.node_loads(), 0);

    assert_eq!(top_defs(&lazy, fx.call), vec![fx.alice]);
    let touched = store.node_loads();
    assert!(touched > 0);
    assert!(touched < fx.program.len());
    assert!(!lazy.is_pending(fx.call));

    // Loaded nodes stay loaded.
    assert_eq!(top_defs(&lazy, fx.call), vec![fx.alice]);
    assert_eq!(store.node_loads(), touched);
}

#[test]
fn concurrent_queries_materialize_each_node_once() {
    let fx = alice("shared");
    let store = Arc::new(InMemoryStore::new());
    store.save_program(&fx.program).unwrap();
    let lazy = load_lazy(store.clone(), "shared").unwrap();
    let query = Query::new().with_program(&lazy);

    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                let found = query
                    .search(&query.programs(), SearchMode::NAME, &Matcher::exact("alice"))
                    .unwrap();
                assert_eq!(found, vec![ValueHandle::new("shared", fx.alice)]);
            });
        }
    });
    // A whole-program search reads every node, each exactly once.
    assert_eq!(store.node_loads(), fx.program.len());
    assert_eq!(lazy.nodes().unwrap(), fx.program.nodes().unwrap());
}

#[test]
fn lazy_node_missing_from_store_is_not_found() {
    let fx = alice("gone");
    let store = Arc::new(InMemoryStore::new());
    store.save_program(&fx.program).unwrap();
    let lazy = load_lazy(store.clone(), "gone").unwrap();
    store.delete_program("gone").unwrap();

    assert!(matches!(
        lazy.get(fx.call),
        Err(ssaflow_core::CoreError::LazyLoad { .. })
    ));
    assert!(lazy.lookup(fx.call).is_none());
    assert!(matches!(load_lazy(store, "gone"), Err(StorageError::ProgramNotFound(_))));
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

#[test]
fn sqlite_snapshot_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.db");
    let fx = alice("disk");

    let summary = {
        let store = SqliteStore::new(&path).unwrap();
        store.save_program(&fx.program).unwrap()
    };

    let store = Arc::new(SqliteStore::new(&path).unwrap());
    assert_eq!(store.list_programs().unwrap(), vec![summary]);

    let full = store.load_program("disk").unwrap();
    assert_eq!(full.nodes().unwrap(), fx.program.nodes().unwrap());
    full.verify_use_def().unwrap();

    let lazy = load_lazy(store, "disk").unwrap();
    assert_eq!(top_defs(&lazy, fx.call), vec![fx.alice]);
}

#[test]
fn snapshot_hash_matches_across_backends() {
    let fx = alice("same");
    let memory = InMemoryStore::new().save_program(&fx.program).unwrap();
    let sqlite = SqliteStore::in_memory()
        .unwrap()
        .save_program(&fx.program)
        .unwrap();
    assert_eq!(memory, sqlite);
}

// ---------------------------------------------------------------------------
// Source index as build cache
// ---------------------------------------------------------------------------

/// One `name = "text"` assignment per line.
struct Assignments;

impl LanguageFrontend for Assignments {
    fn language(&self) -> Language {
        Language::Yak
    }

    fn filter_file(&self, path: &str) -> bool {
        path.ends_with(".yak")
    }

    fn build(&self, source: &str, _: bool, b: &mut Builder<'_>) -> Result<(), BuildError> {
        for line in source.lines() {
            if let Some((name, text)) = line.split_once('=') {
                let v = b.const_value(text.trim().trim_matches('"'))?;
                b.assign_variable(name.trim(), v)?;
            }
        }
        Ok(())
    }
}

#[test]
fn recorded_sources_seed_the_build_cache() {
    let source = "a = \"one\"";
    let fs = Arc::new(MemoryFs::new().with_file("a.yak", source));
    let registry = FrontendRegistry::new().with(Arc::new(Assignments));
    let store = InMemoryStore::new();

    let mut first = ProjectBuilder::new(ParseConfig::default(), registry.clone(), fs.clone());
    let FileOutcome::Built { program, .. } = first.build_file("a.yak").unwrap() else {
        panic!("expected a fresh build");
    };
    store.save_program(&program).unwrap();
    let hash = SourceEditor::new(source).source_hash().to_string();
    store.record_source(program.name(), &hash).unwrap();

    let mut second = ProjectBuilder::new(ParseConfig::default(), registry, fs)
        .with_cache(store.source_cache().unwrap());
    match second.build_file("a.yak").unwrap() {
        FileOutcome::Cached { hash: cached } => assert_eq!(cached, hash),
        FileOutcome::Built { .. } => panic!("expected a cache hit"),
    }
}
