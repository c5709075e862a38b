//! Storage for compiled ssaflow programs.
//!
//! Provides the [`GraphStore`] trait defining the storage contract that all
//! backends implement, plus [`InMemoryStore`] and [`SqliteStore`] as
//! first-class backends. A stored program can come back fully materialized
//! ([`GraphStore::load_program`]) or lazily ([`load_lazy`]), in which case
//! each node is fetched the first time a query touches it.
//!
//! The store also keeps the `(program, source hash)` index the build cache
//! is seeded from.
//!
//! # Modules
//!
//! - [`error`]: StorageError enum with all failure modes
//! - [`types`]: ProgramSummary
//! - [`traits`]: GraphStore trait, lazy reload
//! - [`convert`]: Program decompose/recompose functions
//! - [`hash`]: blake3 node and snapshot hashes
//! - [`memory`]: InMemoryStore implementation
//! - [`schema`]: SQL schema, connection setup and migrations
//! - [`sqlite`]: SqliteStore implementation

pub mod convert;
pub mod error;
pub mod hash;
pub mod memory;
pub mod schema;
pub mod sqlite;
pub mod traits;
pub mod types;

pub use convert::{decompose, recompose, DecomposedProgram, NodeRow};
pub use error::StorageError;
pub use hash::{hash_node, hash_snapshot};
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{load_lazy, GraphStore, StoreLoader};
pub use types::ProgramSummary;
