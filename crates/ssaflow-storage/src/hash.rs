//! Deterministic content hashing for snapshots using blake3.
//!
//! # Levels
//!
//! - **Level 1**: node hash (the serialized instruction)
//! - **Level 2**: snapshot hash (program parts, then every node hash in id
//!   order)
//!
//! # Determinism
//!
//! Instructions and program parts hold only ordered collections (`Vec`,
//! `IndexMap`, `IndexSet`), so `serde_json::to_vec` yields the same bytes
//! for the same content.

use ssaflow_core::{Instruction, ProgramParts};

use crate::error::StorageError;

/// Hash of one instruction, including its use-def and member relations.
pub fn hash_node(node: &Instruction) -> Result<blake3::Hash, StorageError> {
    let bytes = serde_json::to_vec(node)?;
    Ok(blake3::hash(&bytes))
}

/// Hash of a whole snapshot. `node_hashes` must be in id order.
pub fn hash_snapshot(
    parts: &ProgramParts,
    node_hashes: &[blake3::Hash],
) -> Result<blake3::Hash, StorageError> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&serde_json::to_vec(parts)?);
    hasher.update(&(node_hashes.len() as u64).to_le_bytes());
    for hash in node_hashes {
        hasher.update(hash.as_bytes());
    }
    Ok(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssaflow_core::{ConstValue, InstKind, Program, ValueId};

    fn konst(id: u32, value: i64) -> Instruction {
        Instruction::new(
            ValueId(id),
            InstKind::Const {
                value: ConstValue::Int(value),
            },
        )
    }

    #[test]
    fn node_hash_is_deterministic_and_content_sensitive() {
        let a = hash_node(&konst(1, 7)).unwrap();
        assert_eq!(a, hash_node(&konst(1, 7)).unwrap());
        assert_ne!(a, hash_node(&konst(1, 8)).unwrap());
        assert_ne!(a, hash_node(&konst(2, 7)).unwrap());
    }

    #[test]
    fn snapshot_hash_depends_on_node_order() {
        let parts = Program::new("p").parts();
        let x = hash_node(&konst(1, 1)).unwrap();
        let y = hash_node(&konst(2, 2)).unwrap();
        let forward = hash_snapshot(&parts, &[x, y]).unwrap();
        assert_eq!(forward, hash_snapshot(&parts, &[x, y]).unwrap());
        assert_ne!(forward, hash_snapshot(&parts, &[y, x]).unwrap());
        assert_ne!(forward, hash_snapshot(&parts, &[x]).unwrap());
    }
}
