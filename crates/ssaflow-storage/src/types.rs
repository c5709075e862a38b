//! Storage-layer metadata about stored programs.

use serde::{Deserialize, Serialize};

/// Summary of a stored program (for listing).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramSummary {
    pub name: String,
    /// Number of stored nodes.
    pub nodes: usize,
    /// Hex blake3 hash over the program's parts and every node.
    pub snapshot_hash: String,
}
