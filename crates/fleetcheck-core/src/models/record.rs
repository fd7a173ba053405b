//! Sync-state contract shared by every synchronizable record

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// Reserved id substituted for a mandatory parent reference that cannot be
/// resolved after the parent type's own sync step.
pub const PLACEHOLDER_PARENT_ID: &str = "00000000-0000-0000-0000-000000000000";

/// A unique record identifier within one entity type.
///
/// Locally created records use UUID v7 (time-sortable); ids minted by the
/// server are carried through opaquely. Ids are only unique per entity type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(String);

impl RecordId {
    /// Mint a new unique record ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// The reserved placeholder parent id
    #[must_use]
    pub fn placeholder() -> Self {
        Self(PLACEHOLDER_PARENT_ID.to_string())
    }

    /// Whether this id is the reserved placeholder parent
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.0 == PLACEHOLDER_PARENT_ID
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("record id cannot be empty".into()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// A category of synchronizable record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    VehicleGroups,
    Vehicles,
    Checklists,
}

impl EntityKind {
    /// Every entity type, in declaration order.
    pub const ALL: [Self; 3] = [Self::VehicleGroups, Self::Vehicles, Self::Checklists];

    /// Stable key used for storage rows and URL paths.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::VehicleGroups => "vehicle_groups",
            Self::Vehicles => "vehicles",
            Self::Checklists => "checklists",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Per-record synchronization state.
///
/// `Conflict` is terminal until explicit resolution: the engine never
/// silently overwrites a conflicted record's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Synced,
    PendingUpload,
    PendingDownload,
    Conflict,
}

impl SyncStatus {
    /// Stable key used for the storage column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::PendingUpload => "pending_upload",
            Self::PendingDownload => "pending_download",
            Self::Conflict => "conflict",
        }
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "synced" => Ok(Self::Synced),
            "pending_upload" => Ok(Self::PendingUpload),
            "pending_download" => Ok(Self::PendingDownload),
            "conflict" => Ok(Self::Conflict),
            other => Err(Error::InvalidInput(format!("unknown sync status: {other}"))),
        }
    }
}

/// Sync metadata carried by every record copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMeta {
    /// Monotonically increasing version, bumped on every committed mutation
    pub version: i64,
    /// Timestamp of the last mutation (Unix ms; server clock for
    /// remote-sourced edits, local clock for local edits)
    pub last_modified_at: i64,
    /// Current sync state of this copy
    pub status: SyncStatus,
}

impl SyncMeta {
    /// Metadata for a freshly created local record (not yet on the server).
    #[must_use]
    pub fn new_local() -> Self {
        Self {
            version: 1,
            last_modified_at: chrono::Utc::now().timestamp_millis(),
            status: SyncStatus::PendingUpload,
        }
    }

    /// Metadata adopted from an authoritative remote copy.
    #[must_use]
    pub const fn synced(version: i64, last_modified_at: i64) -> Self {
        Self {
            version,
            last_modified_at,
            status: SyncStatus::Synced,
        }
    }

    /// Metadata after a committed local edit: version bumped, local clock,
    /// queued for upload.
    #[must_use]
    pub fn touched(self) -> Self {
        Self {
            version: self.version + 1,
            last_modified_at: chrono::Utc::now().timestamp_millis(),
            status: SyncStatus::PendingUpload,
        }
    }
}

/// The contract every synchronizable record satisfies.
///
/// Pure data: the sync engine reads identity and metadata through this trait
/// and treats the rest of the record as an opaque payload. Metadata updates
/// return a new record rather than mutating in place, so concurrent readers
/// of a previous copy stay safe.
pub trait SyncRecord: Clone + Send + Sync + 'static {
    /// Stable unique identifier within this record's entity type
    fn record_id(&self) -> &RecordId;

    /// Monotonically increasing version
    fn version(&self) -> i64;

    /// Timestamp of the last mutation (Unix ms)
    fn last_modified_at(&self) -> i64;

    /// Current sync state
    fn sync_status(&self) -> SyncStatus;

    /// Return a copy of this record with replaced sync metadata
    #[must_use]
    fn with_sync_meta(&self, status: SyncStatus, last_modified_at: i64, version: i64) -> Self;

    /// Whether this copy has local changes queued for upload
    fn is_pending_upload(&self) -> bool {
        self.sync_status() == SyncStatus::PendingUpload
    }
}

/// A declared foreign reference from one record to a parent entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignRef {
    /// Entity type of the referent
    pub target: EntityKind,
    /// Referenced id, if currently set
    pub id: Option<RecordId>,
    /// Whether the relationship is mandatory (placeholder on dangling)
    /// or optional (cleared to `None` on dangling)
    pub mandatory: bool,
}

/// Records whose payload carries foreign references to parent entity types.
///
/// The dependency sequencer repairs dangling references through this trait
/// after the parent type's own sync step; types without parents keep the
/// default empty implementation.
pub trait ForeignKeyed: SyncRecord {
    /// Declared foreign references of this record
    fn foreign_refs(&self) -> Vec<ForeignRef> {
        Vec::new()
    }

    /// Return a copy with the reference to `target` replaced.
    ///
    /// `None` clears an optional reference; mandatory references receive the
    /// placeholder parent id instead.
    #[must_use]
    fn with_repaired_ref(&self, target: EntityKind, id: Option<RecordId>) -> Self {
        let _ = (target, id);
        self.clone()
    }
}
