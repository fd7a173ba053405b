//! Database migrations

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get::<_, i32>(0).map(|v| v != 0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version)
}

/// Migration to version 1: generic record storage
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "BEGIN;
         CREATE TABLE IF NOT EXISTS schema_version (
             version INTEGER PRIMARY KEY
         );
         -- One row per record copy; the payload column is opaque JSON the
         -- sync engine never interprets.
         CREATE TABLE IF NOT EXISTS records (
             entity TEXT NOT NULL,
             id TEXT NOT NULL,
             version INTEGER NOT NULL,
             last_modified_at INTEGER NOT NULL,
             sync_status TEXT NOT NULL,
             payload TEXT NOT NULL,
             PRIMARY KEY (entity, id)
         );
         CREATE INDEX IF NOT EXISTS idx_records_status
             ON records(entity, sync_status);
         CREATE INDEX IF NOT EXISTS idx_records_modified
             ON records(entity, last_modified_at DESC);
         INSERT INTO schema_version (version) VALUES (1);
         COMMIT;",
    )?;

    tracing::info!("Migrated database to version 1");
    Ok(())
}

/// Migration to version 2: conflict log
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "BEGIN;
         CREATE TABLE IF NOT EXISTS sync_conflicts (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             entity TEXT NOT NULL,
             record_id TEXT NOT NULL,
             local_modified_at INTEGER NOT NULL,
             remote_modified_at INTEGER NOT NULL,
             detected_at INTEGER NOT NULL,
             reason TEXT NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_sync_conflicts_record
             ON sync_conflicts(entity, record_id);
         CREATE INDEX IF NOT EXISTS idx_sync_conflicts_detected
             ON sync_conflicts(detected_at DESC);
         INSERT INTO schema_version (version) VALUES (2);
         COMMIT;",
    )?;

    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}
