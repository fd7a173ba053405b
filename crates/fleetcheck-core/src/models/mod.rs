//! Data models for Fleetcheck

mod checklist;
mod conflict;
mod group;
mod record;
mod vehicle;

pub use checklist::{Checklist, ChecklistItem};
pub use conflict::{ConflictLogEntry, ConflictReason, NewConflictLog, RecordConflict};
pub use group::VehicleGroup;
pub use record::{
    EntityKind, ForeignKeyed, ForeignRef, RecordId, SyncMeta, SyncRecord, SyncStatus,
    PLACEHOLDER_PARENT_ID,
};
pub use vehicle::Vehicle;
