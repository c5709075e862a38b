//! Decompose/recompose conversions between [`Program`] and flat storage rows.
//!
//! [`decompose`] splits a program into its parts and one row per node,
//! materializing lazy nodes on the way. [`recompose`] rebuilds a fully
//! materialized program; [`crate::load_lazy`] rebuilds one whose nodes load
//! on demand.

use ssaflow_core::{Instruction, Program, ProgramParts, ValueId};

use crate::error::StorageError;
use crate::hash::{hash_node, hash_snapshot};

/// One stored node with its content hash.
#[derive(Debug, Clone)]
pub struct NodeRow {
    pub node: Instruction,
    pub hash: blake3::Hash,
}

/// A program broken into flat components for storage.
#[derive(Debug, Clone)]
pub struct DecomposedProgram {
    pub parts: ProgramParts,
    /// Nodes in id order.
    pub nodes: Vec<NodeRow>,
    pub snapshot_hash: blake3::Hash,
}

impl DecomposedProgram {
    pub fn ids(&self) -> Vec<ValueId> {
        self.nodes.iter().map(|row| row.node.id).collect()
    }
}

/// Decomposes a program into rows suitable for storage.
pub fn decompose(program: &Program) -> Result<DecomposedProgram, StorageError> {
    let parts = program.parts();
    let nodes = program
        .nodes()?
        .into_iter()
        .map(|node| {
            let hash = hash_node(&node)?;
            Ok(NodeRow { node, hash })
        })
        .collect::<Result<Vec<_>, StorageError>>()?;
    let hashes: Vec<blake3::Hash> = nodes.iter().map(|row| row.hash).collect();
    let snapshot_hash = hash_snapshot(&parts, &hashes)?;
    Ok(DecomposedProgram {
        parts,
        nodes,
        snapshot_hash,
    })
}

/// Rebuilds a fully materialized program.
pub fn recompose(decomposed: DecomposedProgram) -> Program {
    let nodes = decomposed.nodes.into_iter().map(|row| row.node).collect();
    Program::from_parts(decomposed.parts, nodes)
}
