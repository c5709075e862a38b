//! In-memory implementation of [`GraphStore`].
//!
//! [`InMemoryStore`] is a first-class backend for tests and single-process
//! sessions. Programs live in a [`DashMap`], so lazy programs on several
//! threads can load nodes from it concurrently.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::{DashMap, DashSet};
use ssaflow_core::{Instruction, ProgramParts, ValueId};

use crate::convert::DecomposedProgram;
use crate::error::StorageError;
use crate::traits::GraphStore;
use crate::types::ProgramSummary;

/// Data stored for a single program.
#[derive(Debug, Clone)]
struct StoredProgram {
    parts: ProgramParts,
    nodes: BTreeMap<ValueId, Instruction>,
    snapshot_hash: String,
}

impl StoredProgram {
    fn summary(&self) -> ProgramSummary {
        ProgramSummary {
            name: self.parts.name.clone(),
            nodes: self.nodes.len(),
            snapshot_hash: self.snapshot_hash.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    programs: DashMap<String, StoredProgram>,
    sources: DashSet<(String, String)>,
    /// Number of `load_node` calls served.
    node_loads: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many single nodes have been loaded so far.
    pub fn node_loads(&self) -> usize {
        self.node_loads.load(Ordering::Relaxed)
    }
}

impl GraphStore for InMemoryStore {
    fn save_decomposed(&self, decomposed: &DecomposedProgram) -> Result<ProgramSummary, StorageError> {
        let stored = StoredProgram {
            parts: decomposed.parts.clone(),
            nodes: decomposed
                .nodes
                .iter()
                .map(|row| (row.node.id, row.node.clone()))
                .collect(),
            snapshot_hash: decomposed.snapshot_hash.to_hex().to_string(),
        };
        let summary = stored.summary();
        self.programs.insert(summary.name.clone(), stored);
        Ok(summary)
    }

    fn delete_program(&self, name: &str) -> Result<(), StorageError> {
        self.programs
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StorageError::ProgramNotFound(name.to_string()))
    }

    fn list_programs(&self) -> Result<Vec<ProgramSummary>, StorageError> {
        let mut list: Vec<ProgramSummary> = self.programs.iter().map(|p| p.summary()).collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(list)
    }

    fn load_parts(&self, name: &str) -> Result<ProgramParts, StorageError> {
        self.programs
            .get(name)
            .map(|p| p.parts.clone())
            .ok_or_else(|| StorageError::ProgramNotFound(name.to_string()))
    }

    fn node_ids(&self, name: &str) -> Result<Vec<ValueId>, StorageError> {
        self.programs
            .get(name)
            .map(|p| p.nodes.keys().copied().collect())
            .ok_or_else(|| StorageError::ProgramNotFound(name.to_string()))
    }

    fn load_node(&self, name: &str, id: ValueId) -> Result<Instruction, StorageError> {
        let program = self
            .programs
            .get(name)
            .ok_or_else(|| StorageError::ProgramNotFound(name.to_string()))?;
        let node = program
            .nodes
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::NodeNotFound {
                program: name.to_string(),
                id,
            })?;
        self.node_loads.fetch_add(1, Ordering::Relaxed);
        Ok(node)
    }

    fn record_source(&self, program: &str, hash: &str) -> Result<(), StorageError> {
        self.sources.insert((program.to_string(), hash.to_string()));
        Ok(())
    }

    fn has_source(&self, program: &str, hash: &str) -> Result<bool, StorageError> {
        Ok(self.sources.contains(&(program.to_string(), hash.to_string())))
    }

    fn sources(&self) -> Result<Vec<(String, String)>, StorageError> {
        let mut all: Vec<(String, String)> = self.sources.iter().map(|e| e.key().clone()).collect();
        all.sort();
        Ok(all)
    }
}
