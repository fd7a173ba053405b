//! Dependency-ordered sync cycle across entity types

use crate::error::{Error, Result};
use crate::models::EntityKind;
use crate::store::StoreCounts;

use super::orchestrator::{EntityReport, EntityRunner, SyncDirection};
use super::sequencer::{DependencyGraph, ParentIndex};

/// A failed entity-type run, isolated from its siblings.
#[derive(Debug)]
pub struct EntityFailure {
    pub entity: EntityKind,
    pub error: Error,
}

/// Outcome of one cycle over every entity type.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Per-type reports, in the order the types ran
    pub reports: Vec<EntityReport>,
    /// Types whose run aborted; already-committed siblings stay valid
    pub failures: Vec<EntityFailure>,
}

impl CycleReport {
    /// Whether every entity type completed without an aborted run.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Whether any failure is worth a backoff retry.
    #[must_use]
    pub fn has_transient_failures(&self) -> bool {
        self.failures.iter().any(|failure| failure.error.is_transient())
            || self
                .reports
                .iter()
                .any(|report| !report.failed_pushes.is_empty())
    }

    #[must_use]
    pub fn total_uploaded(&self) -> usize {
        self.reports.iter().map(|report| report.uploaded).sum()
    }

    #[must_use]
    pub fn total_downloaded(&self) -> usize {
        self.reports.iter().map(|report| report.downloaded).sum()
    }

    #[must_use]
    pub fn total_deleted(&self) -> usize {
        self.reports.iter().map(|report| report.deleted).sum()
    }

    #[must_use]
    pub fn total_conflicts(&self) -> usize {
        self.reports.iter().map(|report| report.conflicts).sum()
    }
}

/// Drives every entity type through one sync pass, parents first.
///
/// Entity types run strictly sequentially: a child type's foreign-reference
/// repair needs its parents durably committed, so the order from the
/// dependency graph is authoritative and never parallelized.
pub struct SyncCycle {
    runners: Vec<Box<dyn EntityRunner>>,
}

impl SyncCycle {
    /// Build a cycle from runners and the static reference graph.
    ///
    /// Fails when the graph is cyclic or a runner's entity type is missing
    /// from the graph.
    pub fn new(graph: &DependencyGraph, mut runners: Vec<Box<dyn EntityRunner>>) -> Result<Self> {
        let mut ordered = Vec::with_capacity(runners.len());
        for kind in graph.sorted()? {
            if let Some(index) = runners.iter().position(|runner| runner.entity() == kind) {
                ordered.push(runners.remove(index));
            }
        }

        if let Some(stray) = runners.first() {
            return Err(Error::InvalidInput(format!(
                "entity type {} is not declared in the dependency graph",
                stray.entity()
            )));
        }

        Ok(Self { runners: ordered })
    }

    /// Run one pass over every entity type.
    ///
    /// An authentication failure aborts the remaining types; any other
    /// failure is recorded and the siblings still run.
    pub async fn run(&mut self, direction: SyncDirection) -> Result<CycleReport> {
        let mut report = CycleReport::default();
        let mut parents = ParentIndex::new();

        for runner in &mut self.runners {
            let entity = runner.entity();
            match runner.run(direction, &parents).await {
                Ok(entity_report) => report.reports.push(entity_report),
                Err(error @ Error::Authentication(_)) => return Err(error),
                Err(error) => {
                    tracing::error!("Sync of {entity} failed: {error}");
                    report.failures.push(EntityFailure { entity, error });
                }
            }

            // Children repair their references against what is actually
            // committed, whether or not this type's run went through.
            match runner.local_ids() {
                Ok(ids) => parents.insert_ids(entity, ids),
                Err(error) => {
                    tracing::warn!("Could not index committed {entity} ids: {error}");
                }
            }
        }

        Ok(report)
    }

    /// Push every type's pending local changes, then run the normal pass.
    ///
    /// Uploading first shrinks the window in which an unsynced local edit
    /// could be clobbered by an incoming download.
    pub async fn run_uploads_first(&mut self, direction: SyncDirection) -> Result<CycleReport> {
        let mut upload_reports = Vec::with_capacity(self.runners.len());
        let mut upload_failures = Vec::new();

        for runner in &mut self.runners {
            let entity = runner.entity();
            match runner.push_pending().await {
                Ok(entity_report) => upload_reports.push(entity_report),
                Err(error @ Error::Authentication(_)) => return Err(error),
                Err(error) => {
                    tracing::error!("Upload pass for {entity} failed: {error}");
                    upload_failures.push(EntityFailure { entity, error });
                }
            }
        }

        let mut report = self.run(direction).await?;

        for uploaded in upload_reports {
            match report
                .reports
                .iter_mut()
                .find(|entry| entry.entity == uploaded.entity)
            {
                Some(entry) => {
                    entry.uploaded += uploaded.uploaded;
                    entry.rejected.extend(uploaded.rejected);
                    entry.failed_pushes.extend(uploaded.failed_pushes);
                }
                None => report.reports.push(uploaded),
            }
        }
        report.failures.extend(upload_failures);

        Ok(report)
    }

    /// Pending-work counters summed over every entity type.
    pub fn counts(&self) -> Result<StoreCounts> {
        self.runners
            .iter()
            .try_fold(StoreCounts::default(), |acc, runner| {
                Ok(acc.merged(runner.counts()?))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{RecordId, SyncRecord, SyncStatus, Vehicle, VehicleGroup};
    use crate::store::memory::{MemoryRemoteStore, RemoteFault};
    use crate::store::{LocalStore, SharedDatabase, SqliteStore};
    use crate::sync::orchestrator::EntitySync;
    use crate::sync::resolver::ConflictStrategy;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    struct Fixture {
        db: SharedDatabase,
        groups_remote: MemoryRemoteStore<VehicleGroup>,
        vehicles_remote: MemoryRemoteStore<Vehicle>,
        cycle: SyncCycle,
    }

    fn fixture(strategy: ConflictStrategy) -> Fixture {
        let db: SharedDatabase = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let groups_remote = MemoryRemoteStore::new();
        let vehicles_remote = MemoryRemoteStore::new();

        let graph = DependencyGraph::new()
            .with_dependency(EntityKind::Vehicles, EntityKind::VehicleGroups);
        let runners: Vec<Box<dyn EntityRunner>> = vec![
            // Deliberately child-first; the graph must reorder them
            Box::new(EntitySync::new(
                EntityKind::Vehicles,
                SqliteStore::new(Arc::clone(&db), EntityKind::Vehicles),
                vehicles_remote.clone(),
                strategy,
            )),
            Box::new(EntitySync::new(
                EntityKind::VehicleGroups,
                SqliteStore::new(Arc::clone(&db), EntityKind::VehicleGroups),
                groups_remote.clone(),
                strategy,
            )),
        ];
        let cycle = SyncCycle::new(&graph, runners).unwrap();

        Fixture {
            db,
            groups_remote,
            vehicles_remote,
            cycle,
        }
    }

    fn vehicles(db: &SharedDatabase) -> Vec<Vehicle> {
        let store: SqliteStore<Vehicle> = SqliteStore::new(Arc::clone(db), EntityKind::Vehicles);
        store.get_all().unwrap()
    }

    #[tokio::test]
    async fn test_parent_ids_resolve_for_children_synced_in_the_same_cycle() {
        let mut fx = fixture(ConflictStrategy::LastWriteWins);
        let group = VehicleGroup::new("Hall 2").with_sync_meta(SyncStatus::Synced, 10, 1);
        let vehicle = Vehicle::new("FL-RK 12", group.id.clone())
            .with_sync_meta(SyncStatus::Synced, 10, 1);
        fx.groups_remote.seed(vec![group]);
        fx.vehicles_remote.seed(vec![vehicle.clone()]);

        let report = fx.cycle.run(SyncDirection::Full).await.unwrap();

        assert!(report.is_clean());
        assert_eq!(report.total_downloaded(), 2);
        // The group landed first, so the vehicle's reference resolved as-is
        let stored = vehicles(&fx.db);
        assert_eq!(stored[0].group_id, vehicle.group_id);
        assert_eq!(report.reports.iter().map(|r| r.repaired_refs).sum::<usize>(), 0);
    }

    #[tokio::test]
    async fn test_failed_type_does_not_abort_siblings() {
        let mut fx = fixture(ConflictStrategy::LastWriteWins);
        fx.groups_remote.set_fetch_fault(RemoteFault::Network);
        let vehicle =
            Vehicle::new("FL-RK 12", RecordId::new()).with_sync_meta(SyncStatus::Synced, 10, 1);
        fx.vehicles_remote.seed(vec![vehicle]);

        let report = fx.cycle.run(SyncDirection::Full).await.unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].entity, EntityKind::VehicleGroups);
        assert!(report.has_transient_failures());
        assert_eq!(vehicles(&fx.db).len(), 1);
    }

    #[tokio::test]
    async fn test_authentication_failure_aborts_remaining_types() {
        let mut fx = fixture(ConflictStrategy::LastWriteWins);
        fx.groups_remote.set_fetch_fault(RemoteFault::Authentication);
        fx.vehicles_remote
            .seed(vec![Vehicle::new("FL-RK 12", RecordId::new())
                .with_sync_meta(SyncStatus::Synced, 10, 1)]);

        let error = fx.cycle.run(SyncDirection::Full).await.unwrap_err();

        assert!(matches!(error, Error::Authentication(_)));
        // Vehicles never ran
        assert!(vehicles(&fx.db).is_empty());
    }

    #[tokio::test]
    async fn test_uploads_first_protects_pending_edits_from_remote_wins() {
        let mut fx = fixture(ConflictStrategy::RemoteWins);
        let local = VehicleGroup::new("Mine");
        let mut store: SqliteStore<VehicleGroup> =
            SqliteStore::new(Arc::clone(&fx.db), EntityKind::VehicleGroups);
        store
            .with_transaction(&mut |writer| writer.upsert(std::slice::from_ref(&local)))
            .unwrap();
        fx.groups_remote.seed(vec![VehicleGroup {
            name: "Theirs".to_string(),
            ..local.clone()
        }
        .with_sync_meta(SyncStatus::Synced, 999, 9)]);

        let report = fx.cycle.run_uploads_first(SyncDirection::Full).await.unwrap();

        assert_eq!(report.total_uploaded(), 1);
        let stored = store
            .get_all()
            .unwrap()
            .into_iter()
            .find(|group| group.id == local.id)
            .unwrap();
        // The pending edit was pushed before the download pass, so the
        // remote-wins pull brought back our own copy
        assert_eq!(stored.name, "Mine");
        assert_eq!(stored.sync_status(), SyncStatus::Synced);
    }

    #[tokio::test]
    async fn test_runner_outside_graph_is_rejected() {
        let db: SharedDatabase = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let graph = DependencyGraph::new().with_node(EntityKind::VehicleGroups);
        let runners: Vec<Box<dyn EntityRunner>> = vec![Box::new(EntitySync::new(
            EntityKind::Vehicles,
            SqliteStore::<Vehicle>::new(db, EntityKind::Vehicles),
            MemoryRemoteStore::new(),
            ConflictStrategy::LastWriteWins,
        ))];

        assert!(matches!(
            SyncCycle::new(&graph, runners),
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_counts_sum_over_entity_types() {
        let fx = fixture(ConflictStrategy::LastWriteWins);
        let mut groups: SqliteStore<VehicleGroup> =
            SqliteStore::new(Arc::clone(&fx.db), EntityKind::VehicleGroups);
        let mut vehicle_store: SqliteStore<Vehicle> =
            SqliteStore::new(Arc::clone(&fx.db), EntityKind::Vehicles);

        groups
            .with_transaction(&mut |writer| writer.upsert(&[VehicleGroup::new("Pending")]))
            .unwrap();
        vehicle_store
            .with_transaction(&mut |writer| {
                writer.upsert(&[Vehicle::new("FL-RK 12", RecordId::new())])
            })
            .unwrap();

        let counts = fx.cycle.counts().unwrap();
        assert_eq!(counts.pending_uploads, 2);
        assert_eq!(counts.conflicts, 0);
    }
}
