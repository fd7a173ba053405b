//! Conflict classification
//!
//! Pure, deterministic, and free of I/O: the resolver looks only at record
//! identity and sync metadata, which keeps it unit-testable in isolation and
//! keeps every storage/network effect in the orchestrator.

use std::collections::HashMap;

use crate::models::{ConflictReason, RecordConflict, RecordId, SyncRecord, SyncStatus};

/// How a pair of diverged copies is reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictStrategy {
    /// Strictly newer `last_modified_at` wins; ties fall through to the
    /// higher version; a tie on both is a conflict, never a guess
    LastWriteWins,
    /// The remote copy always wins
    RemoteWins,
    /// The local copy always wins
    LocalWins,
    /// Every pair is surfaced for manual resolution
    Manual,
}

/// Classified outcome of one resolver invocation for one entity type.
#[derive(Debug, Clone)]
pub struct Resolution<R> {
    /// Records needing no action
    pub resolved: Vec<R>,
    /// Local copies to push upstream
    pub to_upload: Vec<R>,
    /// Remote copies to apply locally
    pub to_download: Vec<R>,
    /// Pairs without a deterministic winner
    pub conflicts: Vec<RecordConflict<R>>,
}

impl<R> Default for Resolution<R> {
    fn default() -> Self {
        Self {
            resolved: Vec::new(),
            to_upload: Vec::new(),
            to_download: Vec::new(),
            conflicts: Vec::new(),
        }
    }
}

impl<R> Resolution<R> {
    /// Whether nothing needs uploading, downloading, or resolving.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.to_upload.is_empty() && self.to_download.is_empty() && self.conflicts.is_empty()
    }
}

/// Classify the union of `local` and `remote` into the four outcome lists.
///
/// Each id lands in exactly one list. Input order is preserved: ids present
/// locally come first, remote-only ids follow in remote order.
pub fn resolve<R: SyncRecord>(
    local: &[R],
    remote: &[R],
    strategy: ConflictStrategy,
) -> Resolution<R> {
    let remote_by_id: HashMap<&RecordId, &R> = remote
        .iter()
        .map(|record| (record.record_id(), record))
        .collect();
    let local_ids: std::collections::HashSet<&RecordId> =
        local.iter().map(SyncRecord::record_id).collect();

    let mut resolution = Resolution::default();

    for local_copy in local {
        match remote_by_id.get(local_copy.record_id()) {
            // A record the remote side has not reported. Incremental fetches
            // do not see the full remote set, so a non-pending record is
            // deliberately left untouched here; only a full sync may decide
            // it was deleted upstream.
            None => {
                if local_copy.is_pending_upload() {
                    resolution.to_upload.push(local_copy.clone());
                } else {
                    resolution.resolved.push(local_copy.clone());
                }
            }
            Some(remote_copy) => {
                classify_pair(local_copy, remote_copy, strategy, &mut resolution);
            }
        }
    }

    for remote_copy in remote {
        if !local_ids.contains(remote_copy.record_id()) {
            resolution.to_download.push(remote_copy.clone());
        }
    }

    resolution
}

fn classify_pair<R: SyncRecord>(
    local: &R,
    remote: &R,
    strategy: ConflictStrategy,
    resolution: &mut Resolution<R>,
) {
    match strategy {
        ConflictStrategy::RemoteWins => resolution.to_download.push(remote.clone()),
        ConflictStrategy::LocalWins => {
            // A conflicted copy only wins by actually reaching the server,
            // so it uploads just like a pending edit does.
            if local.is_pending_upload() || local.sync_status() == SyncStatus::Conflict {
                resolution.to_upload.push(local.clone());
            } else {
                resolution.resolved.push(local.clone());
            }
        }
        ConflictStrategy::Manual => resolution.conflicts.push(RecordConflict {
            id: local.record_id().clone(),
            local: local.clone(),
            remote: remote.clone(),
            reason: ConflictReason::ManualStrategy,
        }),
        ConflictStrategy::LastWriteWins => {
            match (
                local.last_modified_at().cmp(&remote.last_modified_at()),
                local.version().cmp(&remote.version()),
            ) {
                (std::cmp::Ordering::Greater, _) => resolution.to_upload.push(local.clone()),
                (std::cmp::Ordering::Less, _) => resolution.to_download.push(remote.clone()),
                (std::cmp::Ordering::Equal, std::cmp::Ordering::Greater) => {
                    resolution.to_upload.push(local.clone());
                }
                (std::cmp::Ordering::Equal, std::cmp::Ordering::Less) => {
                    resolution.to_download.push(remote.clone());
                }
                (std::cmp::Ordering::Equal, std::cmp::Ordering::Equal) => {
                    resolution.conflicts.push(RecordConflict {
                        id: local.record_id().clone(),
                        local: local.clone(),
                        remote: remote.clone(),
                        reason: ConflictReason::IdenticalTimestampAndVersion,
                    });
                }
            }
        }
    }
}
