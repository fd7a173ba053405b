//! Vehicle group model

use serde::{Deserialize, Serialize};

use super::record::{ForeignKeyed, RecordId, SyncMeta, SyncRecord, SyncStatus};

/// An owning group of vehicles and checklists.
///
/// Groups have no parents of their own, so they sync before every other
/// entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleGroup {
    /// Unique identifier
    pub id: RecordId,
    /// Display name
    pub name: String,
    /// Soft delete flag, queued for upload as a tombstone
    pub is_deleted: bool,
    /// Sync metadata
    pub meta: SyncMeta,
}

impl VehicleGroup {
    /// Create a new locally-authored group, queued for upload.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: RecordId::new(),
            name: name.into(),
            is_deleted: false,
            meta: SyncMeta::new_local(),
        }
    }
}

impl SyncRecord for VehicleGroup {
    fn record_id(&self) -> &RecordId {
        &self.id
    }

    fn version(&self) -> i64 {
        self.meta.version
    }

    fn last_modified_at(&self) -> i64 {
        self.meta.last_modified_at
    }

    fn sync_status(&self) -> SyncStatus {
        self.meta.status
    }

    fn with_sync_meta(&self, status: SyncStatus, last_modified_at: i64, version: i64) -> Self {
        Self {
            meta: SyncMeta {
                version,
                last_modified_at,
                status,
            },
            ..self.clone()
        }
    }
}

impl ForeignKeyed for VehicleGroup {}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_group_is_pending_upload() {
        let group = VehicleGroup::new("Hall 2");
        assert_eq!(group.name, "Hall 2");
        assert_eq!(group.sync_status(), SyncStatus::PendingUpload);
        assert!(!group.is_deleted);
    }

    #[test]
    fn test_with_sync_meta_does_not_touch_payload() {
        let group = VehicleGroup::new("Hall 2");
        let synced = group.with_sync_meta(SyncStatus::Synced, 1234, 7);
        assert_eq!(synced.name, group.name);
        assert_eq!(synced.id, group.id);
        assert_eq!(synced.version(), 7);
        assert_eq!(synced.last_modified_at(), 1234);
        // original copy untouched
        assert_eq!(group.sync_status(), SyncStatus::PendingUpload);
    }

    #[test]
    fn test_groups_declare_no_parents() {
        assert!(VehicleGroup::new("Hall 2").foreign_refs().is_empty());
    }
}
