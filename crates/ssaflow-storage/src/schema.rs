//! SQL schema and connection setup for the SQLite backend.
//!
//! The schema holds one `programs` row per snapshot, one `nodes` row per
//! arena node (so lazy programs can fetch nodes one at a time) and the
//! `sources` index the build cache is seeded from. Migrations are embedded
//! with `include_str!` and tracked through SQLite's `user_version` pragma by
//! `rusqlite_migration`.

use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;
use rusqlite_migration::{Migrations, M};

use crate::error::StorageError;

/// How long a connection waits on a database another store has locked.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        M::up(include_str!("migrations/001_initial_schema.sql")),
    ])
}

/// Where a store keeps its database.
#[derive(Debug, Clone, Copy)]
pub enum Location<'a> {
    File(&'a Path),
    /// Private to one connection and gone when it closes.
    Memory,
}

/// Opens the database at `location` and brings its schema up to date.
pub fn open(location: Location<'_>) -> Result<Connection, StorageError> {
    let mut conn = match location {
        Location::File(path) => {
            let conn = Connection::open(path)?;
            // Snapshots are written in one transaction while lazy programs
            // keep reading single nodes; WAL lets the readers continue.
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            // A second store on the same file waits instead of failing.
            conn.busy_timeout(BUSY_TIMEOUT)?;
            conn
        }
        Location::Memory => Connection::open_in_memory()?,
    };
    // Deleting a program relies on the cascade to its nodes.
    conn.pragma_update(None, "foreign_keys", "ON")?;
    migrations()
        .to_latest(&mut conn)
        .map_err(|e| StorageError::Migration(e.to_string()))?;
    tracing::debug!(?location, version = schema_version(&conn)?, "opened graph database");
    Ok(conn)
}

/// Number of migrations applied to `conn`.
pub fn schema_version(conn: &Connection) -> Result<i64, StorageError> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_valid() {
        assert!(migrations().validate().is_ok());
    }

    #[test]
    fn memory_database_is_migrated() {
        let conn = open(Location::Memory).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), 1);
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('programs', 'nodes', 'sources')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 3);
        let fk: i64 = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn file_database_uses_wal_and_migrates_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.db");
        {
            let conn = open(Location::File(&path)).unwrap();
            let mode: String = conn
                .pragma_query_value(None, "journal_mode", |row| row.get(0))
                .unwrap();
            assert_eq!(mode, "wal");
        }
        // Reopening finds the schema current and applies nothing.
        let conn = open(Location::File(&path)).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), 1);
    }
}
