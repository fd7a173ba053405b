//! Vehicle model

use serde::{Deserialize, Serialize};

use super::record::{EntityKind, ForeignKeyed, ForeignRef, RecordId, SyncMeta, SyncRecord,
    SyncStatus};

/// A tracked vehicle.
///
/// Every vehicle belongs to exactly one group; the relationship is mandatory,
/// so a dangling `group_id` is repaired to the placeholder parent rather
/// than dropping the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    /// Unique identifier
    pub id: RecordId,
    /// Registration plate
    pub registration: String,
    /// Owning group (mandatory foreign reference)
    pub group_id: RecordId,
    /// Soft delete flag, queued for upload as a tombstone
    pub is_deleted: bool,
    /// Sync metadata
    pub meta: SyncMeta,
}

impl Vehicle {
    /// Create a new locally-authored vehicle, queued for upload.
    #[must_use]
    pub fn new(registration: impl Into<String>, group_id: RecordId) -> Self {
        Self {
            id: RecordId::new(),
            registration: registration.into(),
            group_id,
            is_deleted: false,
            meta: SyncMeta::new_local(),
        }
    }
}

impl SyncRecord for Vehicle {
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

impl ForeignKeyed for Vehicle {
    fn foreign_refs(&self) -> Vec<ForeignRef> {
        vec![ForeignRef {
            target: EntityKind::VehicleGroups,
            id: Some(self.group_id.clone()),
            mandatory: true,
        }]
    }

    fn with_repaired_ref(&self, target: EntityKind, id: Option<RecordId>) -> Self {
        if target != EntityKind::VehicleGroups {
            return self.clone();
        }
        Self {
            group_id: id.unwrap_or_else(RecordId::placeholder),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_vehicle_declares_mandatory_group_ref() {
        let group_id = RecordId::new();
        let vehicle = Vehicle::new("FL-RK 12", group_id.clone());
        let refs = vehicle.foreign_refs();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].target, EntityKind::VehicleGroups);
        assert_eq!(refs[0].id, Some(group_id));
        assert!(refs[0].mandatory);
    }

    #[test]
    fn test_repair_substitutes_placeholder() {
        let vehicle = Vehicle::new("FL-RK 12", RecordId::new());
        let repaired = vehicle.with_repaired_ref(EntityKind::VehicleGroups, None);
        assert!(repaired.group_id.is_placeholder());
        assert_eq!(repaired.registration, vehicle.registration);
    }

    #[test]
    fn test_repair_ignores_unrelated_target() {
        let vehicle = Vehicle::new("FL-RK 12", RecordId::new());
        let untouched = vehicle.with_repaired_ref(EntityKind::Checklists, None);
        assert_eq!(untouched, vehicle);
    }
}
