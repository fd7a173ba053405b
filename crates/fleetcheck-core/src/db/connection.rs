//! Database connection management

use std::path::Path;
use std::str::FromStr;

use rusqlite::{params, Connection};

use crate::error::Result;
use crate::models::{ConflictLogEntry, ConflictReason};

use super::migrations;

/// Wrapper around the local `SQLite` connection.
///
/// All record mutations go through [`crate::store::SqliteStore`] transactions;
/// this type only owns the connection, pragmas, and migrations.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let database = Self { conn };
        database.configure()?;
        database.migrate()?;
        Ok(database)
    }

    /// Open an in-memory database (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let database = Self { conn };
        database.configure()?;
        database.migrate()?;
        Ok(database)
    }

    /// Configure `SQLite` for durability and concurrent readers
    fn configure(&self) -> Result<()> {
        // WAL is unsupported for in-memory databases; ignore failures there
        self.conn
            .pragma_update(None, "journal_mode", "WAL")
            .ok();
        self.conn.pragma_update(None, "synchronous", "NORMAL").ok();
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        migrations::run(&self.conn)
    }

    /// Get a reference to the underlying connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Get a mutable reference for transaction scopes
    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// List the most recently detected sync conflicts, newest first.
    pub fn recent_conflicts(&self, limit: usize) -> Result<Vec<ConflictLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, entity, record_id, local_modified_at, remote_modified_at,
                    detected_at, reason
             FROM sync_conflicts
             ORDER BY detected_at DESC, id DESC
             LIMIT ?",
        )?;

        #[allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(
                |(id, entity, record_id, local_modified_at, remote_modified_at, detected_at, reason)| {
                    Ok(ConflictLogEntry {
                        id,
                        entity,
                        record_id,
                        local_modified_at,
                        remote_modified_at,
                        detected_at,
                        reason: ConflictReason::from_str(&reason)?,
                    })
                },
            )
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        let count: i64 = db
            .connection()
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("nested").join("fleetcheck.db");
        let _db = Database::open(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_recent_conflicts_empty() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.recent_conflicts(10).unwrap().is_empty());
    }
}
