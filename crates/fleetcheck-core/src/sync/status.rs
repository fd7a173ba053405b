//! Observable sync state

use std::fmt;

use serde::Serialize;

use crate::error::Error;

/// Stable error category surfaced to callers.
///
/// Observers always get a category, never a raw transport string as the sole
/// signal, so a status indicator can render "offline" or "sign in again"
/// without parsing error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncErrorKind {
    /// No connectivity; runs are skipped, not failed
    Offline,
    /// Transient network or server failure
    Network,
    /// Credentials are stale; re-auth required before the next run
    Authentication,
    /// Local store could not commit
    Storage,
    /// Bad input or server-side validation trouble
    Validation,
}

impl From<&Error> for SyncErrorKind {
    fn from(error: &Error) -> Self {
        match error {
            Error::Network(_) => Self::Network,
            Error::Authentication(_) => Self::Authentication,
            Error::Storage(_) | Error::Database(_) | Error::Io(_) => Self::Storage,
            Error::Serialization(_) | Error::InvalidInput(_) | Error::DependencyCycle(_) => {
                Self::Validation
            }
        }
    }
}

impl fmt::Display for SyncErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Offline => "offline",
            Self::Network => "network failure",
            Self::Authentication => "reauthentication required",
            Self::Storage => "local storage failure",
            Self::Validation => "validation failure",
        };
        f.write_str(label)
    }
}

/// Snapshot published to observers after every state change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStateSnapshot {
    /// Whether a sync cycle is currently active
    pub is_syncing: bool,
    /// Completion time of the last successful cycle (Unix ms)
    pub last_sync_time: Option<i64>,
    /// Records queued for upload across all entity types
    pub pending_uploads: usize,
    /// Unresolved conflicts across all entity types
    pub conflicts: usize,
    /// Category of the most recent failure, cleared on a clean cycle
    pub last_error: Option<SyncErrorKind>,
}
