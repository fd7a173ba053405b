//! `SQLite` implementation of the local store contract

use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{params, Transaction};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{EntityKind, NewConflictLog, RecordId, SyncRecord, SyncStatus};

use super::local::{LocalStore, LocalWriter, StoreCounts};

/// One database shared by the per-entity-type stores.
pub type SharedDatabase = Arc<Mutex<Database>>;

/// `SQLite` store for one entity type over the shared `records` table.
///
/// Records are persisted as opaque JSON payloads; the sync metadata columns
/// are duplicated out of the payload for filtering and counting only.
pub struct SqliteStore<R> {
    db: SharedDatabase,
    entity: EntityKind,
    _marker: PhantomData<fn() -> R>,
}

impl<R> SqliteStore<R> {
    /// Create a store for `entity` over the shared database.
    #[must_use]
    pub fn new(db: SharedDatabase, entity: EntityKind) -> Self {
        Self {
            db,
            entity,
            _marker: PhantomData,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Database>> {
        self.db
            .lock()
            .map_err(|_| Error::Storage("database lock poisoned".to_string()))
    }
}

impl<R> SqliteStore<R>
where
    R: SyncRecord + Serialize + DeserializeOwned,
{
    fn select_payloads(&self, status: Option<SyncStatus>) -> Result<Vec<R>> {
        let db = self.lock()?;
        let (sql, status_key) = match status {
            Some(status) => (
                "SELECT payload FROM records WHERE entity = ? AND sync_status = ?",
                Some(status.as_str()),
            ),
            None => ("SELECT payload FROM records WHERE entity = ?", None),
        };

        let mut stmt = db.connection().prepare(sql)?;
        let payloads: Vec<String> = match status_key {
            Some(key) => stmt
                .query_map(params![self.entity.key(), key], |row| row.get(0))?
                .collect::<rusqlite::Result<_>>()?,
            None => stmt
                .query_map(params![self.entity.key()], |row| row.get(0))?
                .collect::<rusqlite::Result<_>>()?,
        };

        payloads
            .iter()
            .map(|payload| serde_json::from_str(payload).map_err(Into::into))
            .collect()
    }
}

impl<R> LocalStore<R> for SqliteStore<R>
where
    R: SyncRecord + Serialize + DeserializeOwned,
{
    fn get_all(&self) -> Result<Vec<R>> {
        self.select_payloads(None)
    }

    fn pending_uploads(&self) -> Result<Vec<R>> {
        self.select_payloads(Some(SyncStatus::PendingUpload))
    }

    fn counts(&self) -> Result<StoreCounts> {
        let db = self.lock()?;
        let mut stmt = db.connection().prepare(
            "SELECT
                COUNT(*) FILTER (WHERE sync_status = 'pending_upload'),
                COUNT(*) FILTER (WHERE sync_status = 'conflict')
             FROM records WHERE entity = ?",
        )?;
        let (pending_uploads, conflicts): (i64, i64) =
            stmt.query_row(params![self.entity.key()], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?;

        Ok(StoreCounts {
            pending_uploads: usize::try_from(pending_uploads).unwrap_or(0),
            conflicts: usize::try_from(conflicts).unwrap_or(0),
        })
    }

    fn with_transaction(
        &mut self,
        work: &mut dyn FnMut(&mut dyn LocalWriter<R>) -> Result<()>,
    ) -> Result<()> {
        let entity = self.entity;
        let mut db = self
            .db
            .lock()
            .map_err(|_| Error::Storage("database lock poisoned".to_string()))?;
        // Dropping an uncommitted rusqlite transaction rolls it back, so an
        // interrupted run can never leave partial writes behind.
        let tx = db.connection_mut().transaction()?;

        {
            let mut writer = SqliteWriter {
                tx: &tx,
                entity,
                _marker: PhantomData,
            };
            work(&mut writer)?;
        }

        tx.commit()
            .map_err(|error| Error::Storage(format!("transaction commit failed: {error}")))
    }
}

struct SqliteWriter<'a, R> {
    tx: &'a Transaction<'a>,
    entity: EntityKind,
    _marker: PhantomData<fn() -> R>,
}

impl<R> LocalWriter<R> for SqliteWriter<'_, R>
where
    R: SyncRecord + Serialize + DeserializeOwned,
{
    fn upsert(&mut self, records: &[R]) -> Result<()> {
        let mut stmt = self.tx.prepare_cached(
            "INSERT INTO records (entity, id, version, last_modified_at, sync_status, payload)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(entity, id) DO UPDATE SET
                 version = excluded.version,
                 last_modified_at = excluded.last_modified_at,
                 sync_status = excluded.sync_status,
                 payload = excluded.payload",
        )?;

        for record in records {
            let payload = serde_json::to_string(record)?;
            stmt.execute(params![
                self.entity.key(),
                record.record_id().as_str(),
                record.version(),
                record.last_modified_at(),
                record.sync_status().as_str(),
                payload
            ])?;
        }
        Ok(())
    }

    fn delete_by_ids(&mut self, ids: &[RecordId]) -> Result<()> {
        let mut stmt = self
            .tx
            .prepare_cached("DELETE FROM records WHERE entity = ? AND id = ?")?;
        for id in ids {
            stmt.execute(params![self.entity.key(), id.as_str()])?;
        }
        Ok(())
    }

    fn log_conflict(&mut self, entry: &NewConflictLog) -> Result<()> {
        self.tx.execute(
            "INSERT INTO sync_conflicts
                 (entity, record_id, local_modified_at, remote_modified_at, detected_at, reason)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                self.entity.key(),
                entry.record_id.as_str(),
                entry.local_modified_at,
                entry.remote_modified_at,
                chrono::Utc::now().timestamp_millis(),
                entry.reason.as_str()
            ],
        )?;
        Ok(())
    }
}
