//! Build configuration.
//!
//! [`ParseConfig`] is plain serde data so it can be loaded from JSON; the
//! `with_*` methods give a builder-style way to set it up in code.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::BuildError;

/// Front-end languages. Sources without a path default to Yak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Yak,
    Js,
    Php,
    Java,
}

impl Language {
    /// Order in which front-ends are asked whether they accept a file.
    pub const DISPATCH_ORDER: [Language; 4] =
        [Language::Php, Language::Java, Language::Yak, Language::Js];

    /// Position in [`DISPATCH_ORDER`](Self::DISPATCH_ORDER).
    pub fn priority(self) -> usize {
        match self {
            Language::Php => 0,
            Language::Java => 1,
            Language::Yak => 2,
            Language::Js => 3,
        }
    }

    /// Guess from a file extension (without the dot).
    pub fn from_extension(ext: &str) -> Option<Language> {
        match ext.to_ascii_lowercase().as_str() {
            "yak" => Some(Language::Yak),
            "js" | "mjs" | "cjs" => Some(Language::Js),
            "php" => Some(Language::Php),
            "java" => Some(Language::Java),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Language::Yak => "yak",
            Language::Js => "js",
            Language::Php => "php",
            Language::Java => "java",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseConfig {
    /// Force a front-end instead of dispatching by file.
    pub language: Option<Language>,
    pub program_name: String,
    /// Project root enumerated when `entry_files` is empty.
    pub program_path: String,
    pub entry_files: Vec<String>,
    /// Keep building when a file has syntax errors.
    pub ignore_syntax_errors: bool,
    /// Skip sources whose `(program, hash)` is already cached.
    pub enable_cache: bool,
    /// Package new top-level functions are registered in.
    pub package: String,
}

impl Default for ParseConfig {
    fn default() -> Self {
        ParseConfig {
            language: None,
            program_name: "main".to_string(),
            program_path: ".".to_string(),
            entry_files: Vec::new(),
            ignore_syntax_errors: false,
            enable_cache: true,
            package: "main".to_string(),
        }
    }
}

impl ParseConfig {
    pub fn from_json(json: &str) -> Result<Self, BuildError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, BuildError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }

    pub fn with_program_name(mut self, name: impl Into<String>) -> Self {
        self.program_name = name.into();
        self
    }

    pub fn with_program_path(mut self, path: impl Into<String>) -> Self {
        self.program_path = path.into();
        self
    }

    pub fn with_entry_file(mut self, path: impl Into<String>) -> Self {
        self.entry_files.push(path.into());
        self
    }

    pub fn with_ignore_syntax_errors(mut self, ignore: bool) -> Self {
        self.ignore_syntax_errors = ignore;
        self
    }

    pub fn with_cache(mut self, enable: bool) -> Self {
        self.enable_cache = enable;
        self
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }
}
