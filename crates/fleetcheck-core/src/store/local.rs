//! Local store contract

use crate::error::Result;
use crate::models::{NewConflictLog, RecordId, SyncRecord};

/// Pending-work counters surfaced to the observable sync state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    /// Records queued for upload
    pub pending_uploads: usize,
    /// Records flagged as conflicted
    pub conflicts: usize,
}

impl StoreCounts {
    /// Merge counters from another store.
    #[must_use]
    pub const fn merged(self, other: Self) -> Self {
        Self {
            pending_uploads: self.pending_uploads + other.pending_uploads,
            conflicts: self.conflicts + other.conflicts,
        }
    }
}

/// Mutations available inside one local-store transaction.
///
/// Handed out by [`LocalStore::with_transaction`]; every call either commits
/// together with its siblings or not at all.
pub trait LocalWriter<R: SyncRecord> {
    /// Insert or replace records by id
    fn upsert(&mut self, records: &[R]) -> Result<()>;

    /// Delete records by id; missing ids are ignored
    fn delete_by_ids(&mut self, ids: &[RecordId]) -> Result<()>;

    /// Append a row to the conflict log
    fn log_conflict(&mut self, entry: &NewConflictLog) -> Result<()>;
}

/// Contract for the local, transactional record store of one entity type.
///
/// The engine owns all writes to an entity type for the duration of a sync
/// run; exclusivity is enforced by the scheduler's lock, not by the store.
pub trait LocalStore<R: SyncRecord>: Send {
    /// Fetch every record of this entity type
    fn get_all(&self) -> Result<Vec<R>>;

    /// Fetch records queued for upload
    fn pending_uploads(&self) -> Result<Vec<R>>;

    /// Count pending uploads and conflicts
    fn counts(&self) -> Result<StoreCounts>;

    /// Run `work` inside one transaction.
    ///
    /// Commits when `work` returns `Ok`; rolls back every mutation otherwise.
    fn with_transaction(
        &mut self,
        work: &mut dyn FnMut(&mut dyn LocalWriter<R>) -> Result<()>,
    ) -> Result<()>;
}
