//! Language front-ends and dispatch between them.
//!
//! A front-end turns source text into builder calls. The core never parses;
//! it only asks each registered front-end, in [`Language::DISPATCH_ORDER`],
//! whether it takes a file and hands the first taker a [`Builder`].

use std::sync::Arc;

use crate::builder::Builder;
use crate::config::Language;
use crate::error::BuildError;
use crate::fs::FileSystem;

pub trait LanguageFrontend: Send + Sync {
    fn language(&self) -> Language;

    /// `true` if this front-end handles `path`.
    fn filter_file(&self, path: &str) -> bool;

    /// Whether [`extra_file_analysis`](Self::extra_file_analysis) should run
    /// before dispatch, e.g. to read a build manifest next to the file.
    fn enable_extra_file_analysis(&self) -> bool {
        false
    }

    fn extra_file_analysis(&self, _fs: &dyn FileSystem, _path: &str) -> Result<(), BuildError> {
        Ok(())
    }

    /// Compiles `source` into the function the builder has open. Returning
    /// [`BuildError::Skipped`] declines the file without failing the build.
    fn build(
        &self,
        source: &str,
        ignore_syntax_errors: bool,
        builder: &mut Builder<'_>,
    ) -> Result<(), BuildError>;
}

/// Registered front-ends, kept in dispatch order.
#[derive(Clone, Default)]
pub struct FrontendRegistry {
    frontends: Vec<Arc<dyn LanguageFrontend>>,
}

impl FrontendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a front-end, replacing any registered for the same language.
    pub fn register(&mut self, frontend: Arc<dyn LanguageFrontend>) {
        let language = frontend.language();
        self.frontends.retain(|f| f.language() != language);
        self.frontends.push(frontend);
        self.frontends.sort_by_key(|f| f.language().priority());
    }

    pub fn with(mut self, frontend: Arc<dyn LanguageFrontend>) -> Self {
        self.register(frontend);
        self
    }

    pub fn get(&self, language: Language) -> Option<Arc<dyn LanguageFrontend>> {
        self.frontends
            .iter()
            .find(|f| f.language() == language)
            .cloned()
    }

    pub fn languages(&self) -> Vec<Language> {
        self.frontends.iter().map(|f| f.language()).collect()
    }

    /// Picks the front-end for `path`.
    ///
    /// A path-less source goes to `forced`, or Yak. Otherwise the candidates
    /// (only `forced` when set, every front-end in dispatch order when not)
    /// run their extra analysis and are asked in turn; the first that
    /// accepts wins. No taker is a skip, not a failure.
    pub fn select(
        &self,
        path: &str,
        forced: Option<Language>,
        fs: &dyn FileSystem,
    ) -> Result<Arc<dyn LanguageFrontend>, BuildError> {
        if path.is_empty() {
            let language = forced.unwrap_or_default();
            return self.get(language).ok_or(BuildError::NoFrontend {
                path: format!("<{}>", language),
            });
        }

        let candidates: Vec<Arc<dyn LanguageFrontend>> = match forced {
            Some(language) => vec![self.get(language).ok_or_else(|| BuildError::NoFrontend {
                path: path.to_string(),
            })?],
            None => {
                tracing::debug!(path, "no language forced, trying every front-end");
                self.frontends.clone()
            }
        };
        for frontend in candidates {
            if frontend.enable_extra_file_analysis() {
                frontend.extra_file_analysis(fs, path)?;
            }
            if frontend.filter_file(path) {
                return Ok(frontend);
            }
        }
        Err(BuildError::skipped(format!(
            "file '{}' is not supported by any front-end",
            path
        )))
    }
}
