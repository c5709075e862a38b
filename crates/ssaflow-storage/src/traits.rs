//! The [`GraphStore`] trait defining the storage contract for programs.
//!
//! Two-layer API design:
//! - **Row-level** methods (`load_parts`, `node_ids`, `load_node`) are what a
//!   lazily reloaded program needs: its shell up front, then single nodes on
//!   first access.
//! - **Program-level** methods (`save_program`, `load_program`) store and
//!   rebuild whole snapshots.
//!
//! Methods take `&self` so one store can back many lazy programs being
//! queried from several threads at once.

use std::sync::Arc;

use ssaflow_core::{CoreError, Instruction, NodeLoader, Program, ProgramParts, SourceCache, ValueId};

use crate::convert::{decompose, DecomposedProgram};
use crate::error::StorageError;
use crate::types::ProgramSummary;

/// The storage contract for compiled programs.
pub trait GraphStore: Send + Sync {
    // -------------------------------------------------------------------
    // Program-level operations
    // -------------------------------------------------------------------

    /// Stores a decomposed program, replacing any snapshot under its name.
    fn save_decomposed(&self, decomposed: &DecomposedProgram) -> Result<ProgramSummary, StorageError>;

    /// Deletes a program snapshot. Recorded source hashes are kept.
    fn delete_program(&self, name: &str) -> Result<(), StorageError>;

    /// Lists all stored programs, ordered by name.
    fn list_programs(&self) -> Result<Vec<ProgramSummary>, StorageError>;

    // -------------------------------------------------------------------
    // Row-level operations
    // -------------------------------------------------------------------

    /// Everything about a stored program except its nodes.
    fn load_parts(&self, name: &str) -> Result<ProgramParts, StorageError>;

    /// Ids of every stored node, in id order.
    fn node_ids(&self, name: &str) -> Result<Vec<ValueId>, StorageError>;

    fn load_node(&self, name: &str, id: ValueId) -> Result<Instruction, StorageError>;

    // -------------------------------------------------------------------
    // Source-hash index
    // -------------------------------------------------------------------

    /// Records that `hash` has been compiled into `program`.
    fn record_source(&self, program: &str, hash: &str) -> Result<(), StorageError>;

    fn has_source(&self, program: &str, hash: &str) -> Result<bool, StorageError>;

    /// Every recorded `(program, hash)` pair.
    fn sources(&self) -> Result<Vec<(String, String)>, StorageError>;

    // -------------------------------------------------------------------
    // High-level convenience methods
    // -------------------------------------------------------------------

    /// Snapshots a program. Lazy nodes are materialized first.
    fn save_program(&self, program: &Program) -> Result<ProgramSummary, StorageError> {
        let decomposed = decompose(program)?;
        let summary = self.save_decomposed(&decomposed)?;
        tracing::info!(
            program = %summary.name,
            nodes = summary.nodes,
            hash = %summary.snapshot_hash,
            "saved program"
        );
        Ok(summary)
    }

    /// Loads every node and rebuilds a fully materialized program.
    fn load_program(&self, name: &str) -> Result<Program, StorageError> {
        let parts = self.load_parts(name)?;
        let nodes = self
            .node_ids(name)?
            .into_iter()
            .map(|id| self.load_node(name, id))
            .collect::<Result<Vec<_>, StorageError>>()?;
        Ok(Program::from_parts(parts, nodes))
    }

    /// The recorded source hashes as a build cache.
    fn source_cache(&self) -> Result<SourceCache, StorageError> {
        let mut cache = SourceCache::new();
        for (program, hash) in self.sources()? {
            cache.insert(&program, &hash);
        }
        Ok(cache)
    }
}

/// Adapts a [`GraphStore`] to the core's [`NodeLoader`].
pub struct StoreLoader {
    store: Arc<dyn GraphStore>,
}

impl StoreLoader {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        StoreLoader { store }
    }
}

impl NodeLoader for StoreLoader {
    fn load_node(&self, program: &str, id: ValueId) -> Result<Instruction, CoreError> {
        self.store
            .load_node(program, id)
            .map_err(|err| err.into_lazy_load(id))
    }
}

/// Reloads a stored program with every node as a placeholder. Nodes are
/// fetched from `store` the first time anything reads them.
pub fn load_lazy(store: Arc<dyn GraphStore>, name: &str) -> Result<Program, StorageError> {
    let parts = store.load_parts(name)?;
    let ids = store.node_ids(name)?;
    tracing::debug!(program = name, nodes = ids.len(), "lazy reload");
    Ok(Program::lazy(parts, &ids, Arc::new(StoreLoader::new(store))))
}
