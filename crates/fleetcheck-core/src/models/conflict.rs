//! Sync conflict models

use std::fmt;

use serde::{Deserialize, Serialize};

use super::record::RecordId;

/// Why the resolver refused to pick a winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    /// Both copies carry the same timestamp and version
    IdenticalTimestampAndVersion,
    /// The manual-resolution strategy never auto-applies
    ManualStrategy,
}

impl ConflictReason {
    /// Stable key used for the storage column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::IdenticalTimestampAndVersion => "identical_timestamp_and_version",
            Self::ManualStrategy => "manual_strategy",
        }
    }
}

impl std::str::FromStr for ConflictReason {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "identical_timestamp_and_version" => Ok(Self::IdenticalTimestampAndVersion),
            "manual_strategy" => Ok(Self::ManualStrategy),
            other => Err(crate::error::Error::InvalidInput(format!(
                "unknown conflict reason: {other}"
            ))),
        }
    }
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IdenticalTimestampAndVersion => f.write_str("identical timestamp and version"),
            Self::ManualStrategy => f.write_str("manual resolution requested"),
        }
    }
}

/// A pair of copies the resolver could not deterministically reconcile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordConflict<R> {
    /// Shared record id
    pub id: RecordId,
    /// Local copy, left untouched pending resolution
    pub local: R,
    /// Remote copy at detection time
    pub remote: R,
    /// Why no winner was picked
    pub reason: ConflictReason,
}

/// Conflict log row persisted when a conflict is materialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictLogEntry {
    /// Conflict row identifier
    pub id: i64,
    /// Entity type key of the conflicted record
    pub entity: String,
    /// Conflicted record id
    pub record_id: String,
    /// Local copy's timestamp at detection (Unix ms)
    pub local_modified_at: i64,
    /// Remote copy's timestamp at detection (Unix ms)
    pub remote_modified_at: i64,
    /// Detection timestamp (Unix ms)
    pub detected_at: i64,
    /// Reason the resolver refused to pick
    pub reason: ConflictReason,
}

/// Conflict log row to be inserted, before the database assigns a row id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewConflictLog {
    pub record_id: RecordId,
    pub local_modified_at: i64,
    pub remote_modified_at: i64,
    pub reason: ConflictReason,
}
