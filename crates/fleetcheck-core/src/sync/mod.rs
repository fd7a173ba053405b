//! Offline-first synchronization engine
//!
//! Layered bottom-up: the resolver is a pure classification function, the
//! orchestrator applies one entity type's classification through the store
//! contracts, the cycle drives all entity types in dependency order, and the
//! scheduler decides when cycles run at all.

mod cycle;
mod orchestrator;
mod resolver;
mod scheduler;
mod sequencer;
mod status;

pub use cycle::{CycleReport, EntityFailure, SyncCycle};
pub use orchestrator::{EntityReport, EntityRunner, EntitySync, RejectedPush, SyncDirection};
pub use resolver::{resolve, ConflictStrategy, Resolution};
pub use scheduler::{backoff_delay, SchedulerConfig, SyncScheduler, TriggerOutcome};
pub use sequencer::{repair_foreign_refs, DependencyGraph, ParentIndex};
pub use status::{SyncErrorKind, SyncStateSnapshot};
