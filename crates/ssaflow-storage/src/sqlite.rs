//! SQLite implementation of [`GraphStore`].
//!
//! [`SqliteStore`] persists program snapshots in a SQLite database with WAL
//! mode, a transaction around every snapshot write, and automatic schema
//! migrations. Program parts and nodes are stored as JSON TEXT columns via
//! serde_json, one row per node so a lazy program can fetch them singly.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use ssaflow_core::{Instruction, ProgramParts, ValueId};

use crate::convert::DecomposedProgram;
use crate::error::StorageError;
use crate::schema::{self, Location};
use crate::traits::GraphStore;
use crate::types::ProgramSummary;

/// SQLite-backed implementation of [`GraphStore`].
///
/// The connection sits behind a mutex: SQLite serializes access anyway, and
/// the store must be shareable with lazy programs on other threads.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) a SQLite database at `path`.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = schema::open(Location::File(path.as_ref()))?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    /// Opens an in-memory SQLite database (for testing).
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = schema::open(Location::Memory)?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    /// A panic while holding the lock leaves no partial write behind (every
    /// write is a transaction), so a poisoned lock is still usable.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn assert_program_exists(conn: &Connection, name: &str) -> Result<(), StorageError> {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM programs WHERE name = ?1)",
            params![name],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(StorageError::ProgramNotFound(name.to_string()));
        }
        Ok(())
    }
}

impl GraphStore for SqliteStore {
    fn save_decomposed(&self, decomposed: &DecomposedProgram) -> Result<ProgramSummary, StorageError> {
        let name = decomposed.parts.name.clone();
        let snapshot_hash = decomposed.snapshot_hash.to_hex().to_string();
        let parts = serde_json::to_string(&decomposed.parts)?;

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        // Cascades to the node rows.
        tx.execute("DELETE FROM programs WHERE name = ?1", params![name])?;
        tx.execute(
            "INSERT INTO programs (name, parts, snapshot_hash, node_count) VALUES (?1, ?2, ?3, ?4)",
            params![name, parts, snapshot_hash, decomposed.nodes.len() as i64],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO nodes (program, id, opcode, body, hash) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for row in &decomposed.nodes {
                let body = serde_json::to_string(&row.node)?;
                stmt.execute(params![
                    name,
                    row.node.id.0,
                    format!("{:?}", row.node.opcode()),
                    body,
                    row.hash.to_hex().to_string(),
                ])?;
            }
        }
        tx.commit()?;

        Ok(ProgramSummary {
            name,
            nodes: decomposed.nodes.len(),
            snapshot_hash,
        })
    }

    fn delete_program(&self, name: &str) -> Result<(), StorageError> {
        let conn = self.conn();
        let deleted = conn.execute("DELETE FROM programs WHERE name = ?1", params![name])?;
        if deleted == 0 {
            return Err(StorageError::ProgramNotFound(name.to_string()));
        }
        Ok(())
    }

    fn list_programs(&self) -> Result<Vec<ProgramSummary>, StorageError> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT name, node_count, snapshot_hash FROM programs ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok(ProgramSummary {
                name: row.get(0)?,
                nodes: row.get::<_, i64>(1)? as usize,
                snapshot_hash: row.get(2)?,
            })
        })?;
        let mut list = Vec::new();
        for row in rows {
            list.push(row?);
        }
        Ok(list)
    }

    fn load_parts(&self, name: &str) -> Result<ProgramParts, StorageError> {
        let conn = self.conn();
        let parts: Option<String> = conn
            .query_row(
                "SELECT parts FROM programs WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        let parts = parts.ok_or_else(|| StorageError::ProgramNotFound(name.to_string()))?;
        Ok(serde_json::from_str(&parts)?)
    }

    fn node_ids(&self, name: &str) -> Result<Vec<ValueId>, StorageError> {
        let conn = self.conn();
        Self::assert_program_exists(&conn, name)?;
        let mut stmt = conn.prepare("SELECT id FROM nodes WHERE program = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![name], |row| row.get::<_, u32>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(ValueId(row?));
        }
        Ok(ids)
    }

    fn load_node(&self, name: &str, id: ValueId) -> Result<Instruction, StorageError> {
        let conn = self.conn();
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM nodes WHERE program = ?1 AND id = ?2",
                params![name, id.0],
                |row| row.get(0),
            )
            .optional()?;
        let Some(body) = body else {
            Self::assert_program_exists(&conn, name)?;
            return Err(StorageError::NodeNotFound {
                program: name.to_string(),
                id,
            });
        };
        let node: Instruction = serde_json::from_str(&body)?;
        if node.id != id {
            return Err(StorageError::IntegrityError {
                reason: format!("row {} of '{}' holds node {}", id, name, node.id),
            });
        }
        Ok(node)
    }

    fn record_source(&self, program: &str, hash: &str) -> Result<(), StorageError> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO sources (program, hash) VALUES (?1, ?2)",
            params![program, hash],
        )?;
        Ok(())
    }

    fn has_source(&self, program: &str, hash: &str) -> Result<bool, StorageError> {
        let conn = self.conn();
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sources WHERE program = ?1 AND hash = ?2)",
            params![program, hash],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn sources(&self) -> Result<Vec<(String, String)>, StorageError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT program, hash FROM sources ORDER BY program, hash")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut all = Vec::new();
        for row in rows {
            all.push(row?);
        }
        Ok(all)
    }
}
