//! Builds ssaflow programs from source through language front-ends.
//!
//! A [`LanguageFrontend`] parses a file and drives a [`Builder`]: it opens
//! functions, declares parameters, reads and assigns variables and members,
//! and emits instructions. The builder places phis, captures free values,
//! masks reassigned values and replays closure side effects at call sites.
//! [`ProjectBuilder`] dispatches files to front-ends and guards each file's
//! build.
//!
//! # Modules
//!
//! - [`builder`]: the builder protocol
//! - [`structured`]: if/loop/switch/try layouts
//! - [`frontend`]: front-end trait and dispatch registry
//! - [`project`]: per-file and project builds, source cache
//! - [`config`]: build configuration
//! - [`fs`]: filesystem boundary

pub mod builder;
pub mod config;
pub mod error;
pub mod frontend;
pub mod fs;
pub mod project;
mod scope;
pub mod structured;

pub use builder::{Builder, IncludeHook};
pub use config::{Language, ParseConfig};
pub use error::BuildError;
pub use frontend::{FrontendRegistry, LanguageFrontend};
pub use fs::{DirEntry, FileInfo, FileSystem, LocalFs, MemoryFs};
pub use project::{CacheHitCallback, FileOutcome, ProjectBuilder, ProjectReport};
pub use structured::{IfBuilder, LoopBuilder, SwitchBuilder, TryBuilder};
