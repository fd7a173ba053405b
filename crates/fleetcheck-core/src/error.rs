//! Error types for fleetcheck-core

use thiserror::Error;

/// Result type alias using fleetcheck-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in fleetcheck-core operations
///
/// Per-record push rejections are not represented here: the server rejecting
/// one record is data (`PushOutcome::Rejected`), not a failed operation, so it
/// can never abort the rest of a batch. A detected conflict is likewise a
/// classification, never an error.
#[derive(Error, Debug)]
pub enum Error {
    /// Transient network failure; eligible for retry with backoff
    #[error("Network failure: {0}")]
    Network(String),

    /// Credentials are missing or stale; not retried by backoff
    #[error("Authentication required: {0}")]
    Authentication(String),

    /// Local transaction could not commit
    #[error("Storage failure: {0}")]
    Storage(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Entity-type dependency graph is not a DAG
    #[error("Dependency cycle between entity types: {0}")]
    DependencyCycle(String),
}

impl Error {
    /// Whether the periodic scheduler may retry this failure with backoff.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        match error.status() {
            Some(status)
                if status == reqwest::StatusCode::UNAUTHORIZED
                    || status == reqwest::StatusCode::FORBIDDEN =>
            {
                Self::Authentication(error.to_string())
            }
            _ => Self::Network(error.to_string()),
        }
    }
}
