//! Per-file and project-wide builds.
//!
//! Each source file becomes its own [`Program`]. A file's build is guarded
//! at its boundary: a front-end error or panic becomes an error for that
//! file only, and the project build moves on to the next one.

use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use ssaflow_core::{Program, SourceCache, SourceEditor};

use crate::builder::{Builder, IncludeHook};
use crate::config::ParseConfig;
use crate::error::BuildError;
use crate::frontend::FrontendRegistry;
use crate::fs::FileSystem;

/// Called with `(path, source hash)` when a source is already cached.
pub type CacheHitCallback = Box<dyn FnMut(&str, &str) + Send>;

#[derive(Debug)]
pub enum FileOutcome {
    Built {
        program: Program,
        /// Files compiled in place through includes.
        included: Vec<String>,
    },
    /// `(program name, hash)` was in the cache; nothing was rebuilt.
    Cached { hash: String },
}

/// Result of a project build. Per-file failures are collected, not raised.
#[derive(Debug, Default)]
pub struct ProjectReport {
    pub programs: Vec<Program>,
    pub skipped: Vec<String>,
    /// Files not built as entries because another file included them.
    pub included: Vec<String>,
    pub cache_hits: Vec<String>,
    pub errors: Vec<(String, BuildError)>,
}

impl ProjectReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

pub struct ProjectBuilder {
    config: ParseConfig,
    registry: FrontendRegistry,
    fs: Arc<dyn FileSystem>,
    cache: SourceCache,
    on_cache_hit: Option<CacheHitCallback>,
}

impl ProjectBuilder {
    pub fn new(config: ParseConfig, registry: FrontendRegistry, fs: Arc<dyn FileSystem>) -> Self {
        ProjectBuilder {
            config,
            registry,
            fs,
            cache: SourceCache::new(),
            on_cache_hit: None,
        }
    }

    /// Starts from an existing cache instead of an empty one.
    pub fn with_cache(mut self, cache: SourceCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn on_cache_hit<F>(mut self, f: F) -> Self
    where
        F: FnMut(&str, &str) + Send + 'static,
    {
        self.on_cache_hit = Some(Box::new(f));
        self
    }

    pub fn config(&self) -> &ParseConfig {
        &self.config
    }

    pub fn cache(&self) -> &SourceCache {
        &self.cache
    }

    pub fn into_cache(self) -> SourceCache {
        self.cache
    }

    /// Reads and builds one file.
    pub fn build_file(&mut self, path: &str) -> Result<FileOutcome, BuildError> {
        let source = self.fs.read_file(path)?;
        self.build_source(path, &source)
    }

    /// Builds `source` as a program of its own. `path` picks the front-end
    /// and names the editor; an empty path means an anonymous snippet.
    pub fn build_source(&mut self, path: &str, source: &str) -> Result<FileOutcome, BuildError> {
        let frontend = self
            .registry
            .select(path, self.config.language, self.fs.as_ref())?;
        let editor = SourceEditor::new(source).with_url(path);
        let hash = editor.source_hash().to_string();
        let name = self.config.program_name.clone();

        if self.config.enable_cache && self.cache.contains(&name, &hash) {
            tracing::debug!(path, %hash, "source cache hit");
            if let Some(callback) = self.on_cache_hit.as_mut() {
                callback(path, &hash);
            }
            return Ok(FileOutcome::Cached { hash });
        }

        let start = Instant::now();
        let mut program = Program::new(name.clone());
        program.push_editor(editor);
        let ignore_syntax_errors = self.config.ignore_syntax_errors;
        let package = self.config.package.clone();
        let fs = self.fs.as_ref();
        let cache = self.config.enable_cache.then_some(&self.cache);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let hook = IncludeHook {
                fs,
                frontend: frontend.as_ref(),
                ignore_syntax_errors,
                cache,
            };
            let mut builder = Builder::new(&mut program, package).with_include(hook);
            let main = builder.start_function("main")?;
            builder.program_mut().set_entry(main);
            frontend.build(source, ignore_syntax_errors, &mut builder)?;
            while builder.depth() > 0 {
                builder.finish_function()?;
            }
            Ok::<_, BuildError>((
                builder.included_files().to_vec(),
                builder.include_cache_hits().to_vec(),
            ))
        }));
        program.pop_editor();

        let (included, include_hits) = match outcome {
            Ok(result) => result?,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(path, %message, "build panicked");
                return Err(BuildError::Panicked {
                    file: path.to_string(),
                    message,
                });
            }
        };

        if self.config.enable_cache {
            if let Some(callback) = self.on_cache_hit.as_mut() {
                for (include, include_hash) in &include_hits {
                    callback(include, include_hash);
                }
            }
            self.cache.insert(&name, &hash);
            for include_hash in program.include_files().values() {
                self.cache.insert(&name, include_hash);
            }
        }
        tracing::info!(
            path,
            language = %frontend.language(),
            elapsed = ?start.elapsed(),
            includes = included.len(),
            diagnostics = program.errors().len(),
            "compiled"
        );
        Ok(FileOutcome::Built { program, included })
    }

    /// Builds every entry file, or every file under `program_path` when no
    /// entries are configured.
    ///
    /// Files a previous build included are not built again as entries. Only
    /// a failing single explicit entry fails the whole build.
    pub fn build_project(&mut self) -> Result<ProjectReport, BuildError> {
        let explicit = !self.config.entry_files.is_empty();
        let files: Vec<String> = if explicit {
            let root = self.config.program_path.as_str();
            self.config
                .entry_files
                .iter()
                .map(|f| self.fs.join(&[root, f.as_str()]))
                .collect()
        } else {
            self.fs.walk_files(&self.config.program_path)?
        };
        let single_entry = explicit && files.len() == 1;
        tracing::info!(root = %self.config.program_path, files = files.len(), "build project");

        let mut report = ProjectReport::default();
        let mut consumed: HashSet<String> = HashSet::new();
        for path in files {
            if consumed.contains(&path) {
                tracing::debug!(path, "already compiled through an include");
                report.included.push(path);
                continue;
            }
            let result = match self.fs.read_file(&path) {
                Ok(source) => self.build_source(&path, &source),
                Err(err) => Err(err),
            };
            match result {
                Ok(FileOutcome::Built { program, included }) => {
                    if !included.is_empty() {
                        tracing::info!(path, count = included.len(), "included files will not be built as entries");
                    }
                    consumed.extend(included);
                    report.programs.push(program);
                }
                Ok(FileOutcome::Cached { .. }) => report.cache_hits.push(path),
                Err(err) if err.is_skipped() => {
                    tracing::debug!(path, reason = %err, "skipped");
                    report.skipped.push(path);
                }
                Err(err) if single_entry => return Err(err),
                Err(err) => {
                    tracing::warn!(path, error = %err, "file failed to build");
                    report.errors.push((path, err));
                }
            }
        }
        Ok(report)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
