//! Remote store contract

use async_trait::async_trait;

use crate::error::Result;
use crate::models::SyncRecord;

/// Remote listing window requested by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchWindow {
    /// Complete remote listing; required for deletion reconciliation
    Full,
    /// Records modified at or after the given timestamp (Unix ms)
    Since(i64),
}

/// Result of pushing one record to the remote store.
///
/// A rejection is scoped to the pushed record and never fails its siblings;
/// transport and authentication problems surface as errors instead.
#[derive(Debug, Clone)]
pub enum PushOutcome<R> {
    /// Accepted; carries the authoritative copy with server-assigned
    /// version and timestamp
    Accepted(R),
    /// Rejected by server-side validation
    Rejected {
        /// Server-provided reason
        message: String,
    },
}

/// Contract for the authoritative remote store of one entity type.
///
/// Idempotent retries are the underlying client's responsibility.
#[async_trait]
pub trait RemoteStore<R: SyncRecord>: Send + Sync {
    /// Fetch the remote set for the given window
    async fn fetch_all(&self, window: FetchWindow) -> Result<Vec<R>>;

    /// Push one record upstream
    async fn push(&self, record: &R) -> Result<PushOutcome<R>>;
}

/// Boolean "online" signal consumed by the scheduler as a precondition.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Whether the remote store is currently reachable
    async fn is_online(&self) -> bool;
}
