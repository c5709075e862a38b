//! Project builds through a small line-oriented front-end.
//!
//! The front-end understands one statement per line:
//! - `name = expr` where `expr` is an integer, a `"string"`, a name, or
//!   `expr + expr`
//! - `include path` compiles another file in place
//! - `error message` reports a syntax error
//! - `panic` panics, `skip` declines the file

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ssaflow_build::{
    BuildError, Builder, FileOutcome, FrontendRegistry, Language, LanguageFrontend, MemoryFs,
    ParseConfig, ProjectBuilder,
};
use ssaflow_core::{BinaryOp, ErrorKind, ErrorTag, InstKind, SourceEditor, ValueId};

// ---------------------------------------------------------------------------
// Test front-end
// ---------------------------------------------------------------------------

struct LineFrontend {
    language: Language,
    ext: &'static str,
}

fn expr(b: &mut Builder<'_>, text: &str) -> Result<ValueId, BuildError> {
    if let Some((l, r)) = text.split_once('+') {
        let x = expr(b, l.trim())?;
        let y = expr(b, r.trim())?;
        return b.emit_binop(BinaryOp::Add, x, y);
    }
    if let Ok(n) = text.parse::<i64>() {
        return b.const_value(n);
    }
    if text.starts_with('"') {
        return b.const_value(text.trim_matches('"'));
    }
    b.read_variable(text)
}

impl LanguageFrontend for LineFrontend {
    fn language(&self) -> Language {
        self.language
    }

    fn filter_file(&self, path: &str) -> bool {
        path.ends_with(self.ext)
    }

    fn build(&self, source: &str, ignore_syntax_errors: bool, b: &mut Builder<'_>) -> Result<(), BuildError> {
        let mut offset = 0;
        for raw in source.split('\n') {
            let start = offset;
            offset += raw.len() + 1;
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            b.set_position(start, start + raw.len());
            if let Some(path) = line.strip_prefix("include ") {
                b.include_file(path.trim())?;
                continue;
            }
            if let Some(message) = line.strip_prefix("error ") {
                b.add_error(ErrorKind::Error, ErrorTag::Syntax, message);
                if !ignore_syntax_errors {
                    return Err(BuildError::Frontend {
                        file: String::new(),
                        message: message.to_string(),
                    });
                }
                continue;
            }
            match line {
                "panic" => panic!("line front-end crashed"),
                "skip" => return Err(BuildError::skipped("declined by front-end")),
                _ => {}
            }
            let Some((name, value)) = line.split_once('=') else {
                b.add_error(ErrorKind::Error, ErrorTag::Syntax, format!("bad statement: {}", line));
                continue;
            };
            let value = expr(b, value.trim())?;
            b.assign_variable(name.trim(), value)?;
        }
        Ok(())
    }
}

fn registry() -> FrontendRegistry {
    FrontendRegistry::new()
        .with(Arc::new(LineFrontend {
            language: Language::Yak,
            ext: ".yak",
        }))
        .with(Arc::new(LineFrontend {
            language: Language::Php,
            ext: ".php",
        }))
}

fn project(fs: MemoryFs, config: ParseConfig) -> ProjectBuilder {
    ProjectBuilder::new(config, registry(), Arc::new(fs))
}

/// Log output for debugging a failing test: `RUST_LOG=ssaflow_build=debug`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn built(outcome: FileOutcome) -> ssaflow_core::Program {
    match outcome {
        FileOutcome::Built { program, .. } => program,
        FileOutcome::Cached { .. } => panic!("expected a fresh build"),
    }
}

// ---------------------------------------------------------------------------
// Single files
// ---------------------------------------------------------------------------

#[test]
fn builds_a_snippet_without_path_as_yak() {
    let mut builder = project(MemoryFs::new(), ParseConfig::default());
    let program = built(builder.build_source("", "a = 1\nb = a + 2").unwrap());

    let main = program.entry().unwrap();
    assert_eq!(program.get_function("main", "main"), Some(main));
    let f = program.function(main).unwrap();
    assert!(f.is_finished());
    // Implicit return closes the body.
    assert_eq!(f.returns.len(), 1);
    assert_eq!(program.editor_depth(), 0);
    assert!(program.errors().is_empty());
}

#[test]
fn panicking_front_end_is_contained() {
    let mut builder = project(MemoryFs::new(), ParseConfig::default());
    let err = builder.build_source("boom.yak", "a = 1\npanic").unwrap_err();
    match err {
        BuildError::Panicked { file, message } => {
            assert_eq!(file, "boom.yak");
            assert_eq!(message, "line front-end crashed");
        }
        other => panic!("unexpected error: {other}"),
    }
    // The builder is still usable afterwards.
    assert!(builder.build_source("ok.yak", "a = 1").is_ok());
}

#[test]
fn syntax_errors_fail_unless_ignored() {
    let mut strict = project(MemoryFs::new(), ParseConfig::default());
    assert!(matches!(
        strict.build_source("a.yak", "error unexpected token\nx = 1"),
        Err(BuildError::Frontend { .. })
    ));

    let mut lenient = project(
        MemoryFs::new(),
        ParseConfig::default().with_ignore_syntax_errors(true),
    );
    let program = built(lenient.build_source("a.yak", "error unexpected token\nx = 1").unwrap());
    assert_eq!(program.errors().len(), 1);
    assert_eq!(program.errors()[0].tag, ErrorTag::Syntax);
    assert_eq!(program.errors()[0].range.as_ref().unwrap().url, "a.yak");
}

#[test]
fn cache_hit_skips_rebuild_and_notifies() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let mut builder = project(MemoryFs::new(), ParseConfig::default()).on_cache_hit(move |path, hash| {
        assert_eq!(path, "a.yak");
        assert!(!hash.is_empty());
        counter.fetch_add(1, Ordering::SeqCst);
    });

    assert!(matches!(builder.build_source("a.yak", "x = 1").unwrap(), FileOutcome::Built { .. }));
    assert!(matches!(builder.build_source("a.yak", "x = 1").unwrap(), FileOutcome::Cached { .. }));
    assert!(matches!(builder.build_source("a.yak", "x = 2").unwrap(), FileOutcome::Built { .. }));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(builder.cache().len(), 2);

    let mut uncached = project(MemoryFs::new(), ParseConfig::default().with_cache(false));
    uncached.build_source("a.yak", "x = 1").unwrap();
    assert!(matches!(uncached.build_source("a.yak", "x = 1").unwrap(), FileOutcome::Built { .. }));
}

#[test]
fn include_restores_outer_editor() {
    init_tracing();
    let fs = MemoryFs::new()
        .with_file("app.yak", "include lib/util.yak\nz = y + missing")
        .with_file("lib/util.yak", "y = 1");
    let mut builder = project(fs, ParseConfig::default());
    let outcome = builder.build_file("app.yak").unwrap();
    let FileOutcome::Built { program, included } = outcome else {
        panic!("expected a fresh build");
    };

    assert_eq!(included, vec!["lib/util.yak".to_string()]);
    assert!(program.include_files().contains_key("lib/util.yak"));
    assert_eq!(program.editor_depth(), 0);

    // `y` comes from the included file; the diagnostic for `missing` points
    // back at the outer file.
    assert_eq!(program.errors().len(), 1);
    let diag = &program.errors()[0];
    assert_eq!(diag.tag, ErrorTag::UndefinedValue);
    let range = diag.range.as_ref().unwrap();
    assert_eq!(range.url, "app.yak");
    assert_eq!(range.start.line, 2);

    let main = program.entry().unwrap();
    let one = program
        .ids()
        .find(|id| {
            program.get(*id).is_ok_and(|i| {
                i.function == Some(main) && i.const_value() == Some(&ssaflow_core::ConstValue::Int(1))
            })
        })
        .unwrap();
    assert_eq!(program.get(one).unwrap().range.as_ref().unwrap().url, "lib/util.yak");
    let sum = program
        .get(one)
        .unwrap()
        .users()
        .iter()
        .copied()
        .find(|u| matches!(program.get(*u).unwrap().kind, InstKind::BinOp { .. }));
    assert!(sum.is_some());
}

#[test]
fn cached_include_notifies_and_still_compiles() {
    let fs = MemoryFs::new()
        .with_file("app.yak", "include lib/util.yak\nz = y")
        .with_file("other.yak", "include lib/util.yak\nw = y + 1")
        .with_file("lib/util.yak", "y = 1");
    let hits = Arc::new(Mutex::new(Vec::new()));
    let seen = hits.clone();
    let mut builder = project(fs, ParseConfig::default()).on_cache_hit(move |path, hash| {
        seen.lock().unwrap().push((path.to_string(), hash.to_string()));
    });

    built(builder.build_file("app.yak").unwrap());
    assert!(hits.lock().unwrap().is_empty());
    // The entry and its include are both recorded.
    assert_eq!(builder.cache().len(), 2);

    let program = built(builder.build_file("other.yak").unwrap());
    let util_hash = SourceEditor::new("y = 1").source_hash().to_string();
    assert_eq!(*hits.lock().unwrap(), vec![("lib/util.yak".to_string(), util_hash)]);
    // `y` still resolves inside `other.yak`.
    assert!(program.errors().is_empty());
    assert!(program.include_files().contains_key("lib/util.yak"));
}

#[test]
fn include_cache_is_ignored_when_caching_is_off() {
    let fs = MemoryFs::new()
        .with_file("app.yak", "include lib/util.yak\nz = y")
        .with_file("lib/util.yak", "y = 1");
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let mut builder = project(fs, ParseConfig::default().with_cache(false)).on_cache_hit(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    built(builder.build_file("app.yak").unwrap());
    built(builder.build_file("app.yak").unwrap());
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert!(builder.cache().is_empty());
}

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

#[test]
fn project_collects_per_file_results() {
    init_tracing();
    let fs = MemoryFs::new()
        .with_file("a.yak", "a = 1")
        .with_file("b.php", "b = 2")
        .with_file("boom.yak", "panic")
        .with_file("declined.yak", "skip")
        .with_file("notes.txt", "not code");
    let mut builder = project(fs, ParseConfig::default());
    let report = builder.build_project().unwrap();

    assert_eq!(report.programs.len(), 2);
    assert_eq!(report.skipped, vec!["declined.yak".to_string(), "notes.txt".to_string()]);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].0, "boom.yak");
    assert!(matches!(report.errors[0].1, BuildError::Panicked { .. }));
    assert!(!report.is_clean());
}

#[test]
fn included_files_are_not_entries() {
    let fs = MemoryFs::new()
        .with_file("app.yak", "include lib/util.yak\nz = y")
        .with_file("lib/util.yak", "y = 1");
    let mut builder = project(fs, ParseConfig::default());
    let report = builder.build_project().unwrap();

    assert_eq!(report.programs.len(), 1);
    assert_eq!(report.included, vec!["lib/util.yak".to_string()]);
    assert!(report.is_clean());
}

#[test]
fn single_explicit_entry_failure_fails_the_build() {
    let fs = MemoryFs::new()
        .with_file("boom.yak", "panic")
        .with_file("ok.yak", "a = 1");

    let mut single = project(fs.clone(), ParseConfig::default().with_entry_file("boom.yak"));
    assert!(matches!(single.build_project(), Err(BuildError::Panicked { .. })));

    let mut two = project(
        fs.clone(),
        ParseConfig::default()
            .with_entry_file("boom.yak")
            .with_entry_file("ok.yak"),
    );
    let report = two.build_project().unwrap();
    assert_eq!(report.programs.len(), 1);
    assert_eq!(report.errors.len(), 1);

    let mut missing = project(fs, ParseConfig::default().with_entry_file("nope.yak"));
    assert!(matches!(missing.build_project(), Err(BuildError::MissingSource { .. })));
}

#[test]
fn forced_language_limits_dispatch() {
    let fs = MemoryFs::new()
        .with_file("a.yak", "a = 1")
        .with_file("b.php", "b = 2");
    let mut builder = project(fs, ParseConfig::default().with_language(Language::Php));
    let report = builder.build_project().unwrap();
    assert_eq!(report.programs.len(), 1);
    assert_eq!(report.skipped, vec!["a.yak".to_string()]);
}

#[test]
fn config_loaded_from_json_drives_the_build() {
    let config = ParseConfig::from_json(r#"{"program_name": "demo", "entry_files": ["a.yak"]}"#).unwrap();
    let fs = MemoryFs::new().with_file("a.yak", "a = 1");
    let mut builder = project(fs, config);
    let report = builder.build_project().unwrap();
    assert_eq!(report.programs[0].name(), "demo");
}
