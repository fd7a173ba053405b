//! Checklist model

use serde::{Deserialize, Serialize};

use super::record::{EntityKind, ForeignKeyed, ForeignRef, RecordId, SyncMeta, SyncRecord,
    SyncStatus};

/// A single step within a checklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    /// Human-readable step description
    pub label: String,
    /// Whether the step must be completed
    pub required: bool,
    /// Ordering position within the checklist
    pub position: u32,
}

/// An inspection checklist.
///
/// A checklist may be scoped to one vehicle group; the relationship is
/// optional, so a dangling `group_id` is cleared to `None` and the checklist
/// becomes unscoped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checklist {
    /// Unique identifier
    pub id: RecordId,
    /// Display name
    pub name: String,
    /// Optional owning group
    pub group_id: Option<RecordId>,
    /// Ordered steps
    pub items: Vec<ChecklistItem>,
    /// Soft delete flag, queued for upload as a tombstone
    pub is_deleted: bool,
    /// Sync metadata
    pub meta: SyncMeta,
}

impl Checklist {
    /// Create a new locally-authored checklist, queued for upload.
    #[must_use]
    pub fn new(name: impl Into<String>, group_id: Option<RecordId>) -> Self {
        Self {
            id: RecordId::new(),
            name: name.into(),
            group_id,
            items: Vec::new(),
            is_deleted: false,
            meta: SyncMeta::new_local(),
        }
    }

    /// Append a step at the next position.
    #[must_use]
    pub fn with_item(mut self, label: impl Into<String>, required: bool) -> Self {
        let position = u32::try_from(self.items.len()).unwrap_or(u32::MAX);
        self.items.push(ChecklistItem {
            label: label.into(),
            required,
            position,
        });
        self
    }
}

impl SyncRecord for Checklist {
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

impl ForeignKeyed for Checklist {
    fn foreign_refs(&self) -> Vec<ForeignRef> {
        vec![ForeignRef {
            target: EntityKind::VehicleGroups,
            id: self.group_id.clone(),
            mandatory: false,
        }]
    }

    fn with_repaired_ref(&self, target: EntityKind, id: Option<RecordId>) -> Self {
        if target != EntityKind::VehicleGroups {
            return self.clone();
        }
        Self {
            group_id: id,
            ..self.clone()
        }
    }
}
