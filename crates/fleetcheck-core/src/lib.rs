//! fleetcheck-core - Core library for Fleetcheck
//!
//! This crate contains the shared record models, the local SQLite store,
//! the remote HTTP store, and the offline-first sync engine used by all
//! Fleetcheck interfaces.

pub mod db;
pub mod error;
pub mod models;
pub mod store;
pub mod sync;

pub use error::{Error, Result};
pub use models::{EntityKind, RecordId, SyncStatus};
