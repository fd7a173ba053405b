//! Per-entity-type sync pipeline
//!
//! One run: fetch remote, resolve against the local set, push pending
//! uploads, then apply every local mutation inside a single transaction.
//! Network calls never happen inside the transaction; the pushes run first
//! and only their acknowledged results are committed, so an interrupted run
//! leaves the local store exactly as it was.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::{EntityKind, ForeignKeyed, NewConflictLog, RecordId, SyncRecord, SyncStatus};
use crate::store::{FetchWindow, LocalStore, PushOutcome, RemoteStore, StoreCounts};

use super::resolver::{resolve, ConflictStrategy, Resolution};
use super::sequencer::{repair_foreign_refs, ParentIndex};

/// Scope of one sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    /// Complete remote listing; enables deletion reconciliation
    Full,
    /// Records changed since the last successful run; never deletes
    Incremental,
}

/// A push the server refused for one specific record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedPush {
    pub id: RecordId,
    pub message: String,
}

/// Outcome of one entity-type sync run.
#[derive(Debug, Clone)]
pub struct EntityReport {
    pub entity: EntityKind,
    /// Records pushed and acknowledged
    pub uploaded: usize,
    /// Remote records applied locally
    pub downloaded: usize,
    /// Records removed by full-sync deletion reconciliation
    pub deleted: usize,
    /// Pairs flagged as conflicted this run
    pub conflicts: usize,
    /// Records needing no action
    pub unchanged: usize,
    /// Dangling foreign references repaired, on downloads and on local
    /// records stranded by deletion reconciliation
    pub repaired_refs: usize,
    /// Per-record server-side validation rejections
    pub rejected: Vec<RejectedPush>,
    /// Per-record transient push failures, retried on the next run
    pub failed_pushes: Vec<RejectedPush>,
}

impl EntityReport {
    fn new(entity: EntityKind) -> Self {
        Self {
            entity,
            uploaded: 0,
            downloaded: 0,
            deleted: 0,
            conflicts: 0,
            unchanged: 0,
            repaired_refs: 0,
            rejected: Vec::new(),
            failed_pushes: Vec::new(),
        }
    }
}

/// Type-erased entity-type runner, so one sync cycle can drive stores of
/// different record types in dependency order.
#[async_trait]
pub trait EntityRunner: Send {
    /// The entity type this runner owns
    fn entity(&self) -> EntityKind;

    /// Run one full or incremental sync
    async fn run(&mut self, direction: SyncDirection, parents: &ParentIndex)
        -> Result<EntityReport>;

    /// Push pending local changes without any download pass
    async fn push_pending(&mut self) -> Result<EntityReport>;

    /// Ids currently committed in the local store
    fn local_ids(&self) -> Result<Vec<RecordId>>;

    /// Pending-work counters for the observable sync state
    fn counts(&self) -> Result<StoreCounts>;
}

/// Sync orchestrator for one entity type.
pub struct EntitySync<R, L, S> {
    entity: EntityKind,
    local: L,
    remote: S,
    strategy: ConflictStrategy,
    last_run_at: Option<i64>,
    _marker: std::marker::PhantomData<fn() -> R>,
}

impl<R, L, S> EntitySync<R, L, S>
where
    R: ForeignKeyed,
    L: LocalStore<R>,
    S: RemoteStore<R>,
{
    /// Create an orchestrator over the given store pair.
    pub fn new(entity: EntityKind, local: L, remote: S, strategy: ConflictStrategy) -> Self {
        Self {
            entity,
            local,
            remote,
            strategy,
            last_run_at: None,
            _marker: std::marker::PhantomData,
        }
    }

    fn fetch_window(&self, direction: SyncDirection) -> FetchWindow {
        match (direction, self.last_run_at) {
            (SyncDirection::Full, _) | (SyncDirection::Incremental, None) => FetchWindow::Full,
            (SyncDirection::Incremental, Some(since)) => FetchWindow::Since(since),
        }
    }

    /// Push `records` upstream, splitting the outcomes into acknowledged
    /// copies, validation rejections, and transient failures.
    ///
    /// Only authentication (or other non-transient) errors abort; a network
    /// failure on one record never fails its siblings.
    async fn push_batch(
        &self,
        records: &[R],
        report: &mut EntityReport,
    ) -> Result<Vec<R>> {
        let mut acked = Vec::with_capacity(records.len());

        for record in records {
            match self.remote.push(record).await {
                Ok(PushOutcome::Accepted(updated)) => {
                    acked.push(updated.with_sync_meta(
                        SyncStatus::Synced,
                        updated.last_modified_at(),
                        updated.version(),
                    ));
                }
                Ok(PushOutcome::Rejected { message }) => {
                    tracing::warn!(
                        "Server rejected {} record {}: {message}",
                        self.entity,
                        record.record_id()
                    );
                    report.rejected.push(RejectedPush {
                        id: record.record_id().clone(),
                        message,
                    });
                }
                Err(error) if error.is_transient() => {
                    tracing::warn!(
                        "Push of {} record {} failed, will retry next run: {error}",
                        self.entity,
                        record.record_id()
                    );
                    report.failed_pushes.push(RejectedPush {
                        id: record.record_id().clone(),
                        message: error.to_string(),
                    });
                }
                Err(error) => return Err(error),
            }
        }

        Ok(acked)
    }
}

#[async_trait]
impl<R, L, S> EntityRunner for EntitySync<R, L, S>
where
    R: ForeignKeyed,
    L: LocalStore<R> + Sync,
    S: RemoteStore<R>,
{
    fn entity(&self) -> EntityKind {
        self.entity
    }

    async fn run(
        &mut self,
        direction: SyncDirection,
        parents: &ParentIndex,
    ) -> Result<EntityReport> {
        let started_at = chrono::Utc::now().timestamp_millis();
        let mut report = EntityReport::new(self.entity);

        // A fetch failure aborts here, before any local mutation.
        let remote_set = self.remote.fetch_all(self.fetch_window(direction)).await?;
        let local_set = self.local.get_all()?;

        let remote_by_id: HashMap<&RecordId, &R> = remote_set
            .iter()
            .map(|record| (record.record_id(), record))
            .collect();

        // Two kinds of pairs never reach the resolver: conflicted records
        // stay frozen until explicitly resolved (only the fixed-winner
        // strategies are one), and a Synced record whose metadata matches
        // the remote copy has not diverged on either side.
        let freeze_conflicts = !matches!(
            self.strategy,
            ConflictStrategy::RemoteWins | ConflictStrategy::LocalWins
        );
        let mut settled = 0_usize;
        let mut skip_ids: HashSet<&RecordId> = HashSet::new();
        for record in &local_set {
            let frozen = freeze_conflicts && record.sync_status() == SyncStatus::Conflict;
            let in_step = record.sync_status() == SyncStatus::Synced
                && remote_by_id.get(record.record_id()).is_some_and(|remote| {
                    remote.version() == record.version()
                        && remote.last_modified_at() == record.last_modified_at()
                });
            if frozen || in_step {
                skip_ids.insert(record.record_id());
                settled += 1;
            }
        }

        let live: Vec<R> = local_set
            .iter()
            .filter(|record| !skip_ids.contains(record.record_id()))
            .cloned()
            .collect();
        let remote_input: Vec<R> = remote_set
            .iter()
            .filter(|record| !skip_ids.contains(record.record_id()))
            .cloned()
            .collect();

        let Resolution {
            resolved,
            to_upload,
            to_download,
            conflicts,
        } = resolve(&live, &remote_input, self.strategy);

        let acked = self.push_batch(&to_upload, &mut report).await?;

        let (downloads, repaired) = repair_foreign_refs(to_download, self.entity, parents);

        // Full listings are the only evidence of upstream deletion. Records
        // with local pending changes or an unresolved conflict are spared.
        let deletions: Vec<RecordId> = if direction == SyncDirection::Full {
            let remote_ids: HashSet<&RecordId> =
                remote_set.iter().map(|record| record.record_id()).collect();
            local_set
                .iter()
                .filter(|record| {
                    !remote_ids.contains(record.record_id())
                        && !record.is_pending_upload()
                        && record.sync_status() != SyncStatus::Conflict
                })
                .map(|record| record.record_id().clone())
                .collect()
        } else {
            Vec::new()
        };

        // A full listing can delete a parent in this same cycle and strand
        // local children; surviving records with a reference the parent
        // index cannot resolve are repaired in place. Incremental runs skip
        // this for the same reason they skip deletions.
        let (stranded, stranded_repairs) = if direction == SyncDirection::Full {
            let deletion_ids: HashSet<&RecordId> = deletions.iter().collect();
            let replaced_ids: HashSet<&RecordId> = acked
                .iter()
                .chain(downloads.iter())
                .map(SyncRecord::record_id)
                .chain(conflicts.iter().map(|conflict| &conflict.id))
                .collect();
            let dangling: Vec<R> = local_set
                .iter()
                .filter(|record| {
                    !deletion_ids.contains(record.record_id())
                        && !replaced_ids.contains(record.record_id())
                })
                .filter(|record| {
                    record.foreign_refs().iter().any(|reference| {
                        reference.id.as_ref().is_some_and(|id| {
                            !id.is_placeholder() && !parents.resolves(reference.target, id)
                        })
                    })
                })
                .cloned()
                .collect();
            repair_foreign_refs(dangling, self.entity, parents)
        } else {
            (Vec::new(), 0)
        };

        report.uploaded = acked.len();
        report.downloaded = downloads.len();
        report.deleted = deletions.len();
        report.conflicts = conflicts.len();
        report.unchanged = resolved.len() + settled;
        report.repaired_refs = repaired + stranded_repairs;

        self.local.with_transaction(&mut |writer| {
            writer.upsert(&acked)?;

            for download in &downloads {
                writer.upsert(std::slice::from_ref(&download.with_sync_meta(
                    SyncStatus::Synced,
                    download.last_modified_at(),
                    download.version(),
                )))?;
            }

            writer.upsert(&stranded)?;

            // The conflicted payload is kept exactly as the user left it;
            // only the status flips and a log row is appended.
            for conflict in &conflicts {
                writer.upsert(std::slice::from_ref(&conflict.local.with_sync_meta(
                    SyncStatus::Conflict,
                    conflict.local.last_modified_at(),
                    conflict.local.version(),
                )))?;
                writer.log_conflict(&NewConflictLog {
                    record_id: conflict.id.clone(),
                    local_modified_at: conflict.local.last_modified_at(),
                    remote_modified_at: conflict.remote.last_modified_at(),
                    reason: conflict.reason,
                })?;
            }

            writer.delete_by_ids(&deletions)
        })?;

        self.last_run_at = Some(started_at);

        tracing::info!(
            "Synced {}: {} up, {} down, {} deleted, {} conflicted, {} unchanged",
            self.entity,
            report.uploaded,
            report.downloaded,
            report.deleted,
            report.conflicts,
            report.unchanged
        );
        Ok(report)
    }

    async fn push_pending(&mut self) -> Result<EntityReport> {
        let mut report = EntityReport::new(self.entity);
        let pending = self.local.pending_uploads()?;
        if pending.is_empty() {
            return Ok(report);
        }

        let acked = self.push_batch(&pending, &mut report).await?;
        report.uploaded = acked.len();

        self.local.with_transaction(&mut |writer| writer.upsert(&acked))?;

        tracing::debug!(
            "Pushed {} pending {} record(s) ahead of download pass",
            report.uploaded,
            self.entity
        );
        Ok(report)
    }

    fn local_ids(&self) -> Result<Vec<RecordId>> {
        Ok(self
            .local
            .get_all()?
            .iter()
            .map(|record| record.record_id().clone())
            .collect())
    }

    fn counts(&self) -> Result<StoreCounts> {
        self.local.counts()
    }
}
