//! Background scheduling, triggering, and retry policy

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{watch, Mutex};

use crate::error::{Error, Result};
use crate::store::{ConnectivityProbe, StoreCounts};

use super::cycle::{CycleReport, SyncCycle};
use super::orchestrator::SyncDirection;
use super::status::{SyncErrorKind, SyncStateSnapshot};

const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Timing and retry policy for the scheduler.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Period between automatic incremental passes
    pub interval: Duration,
    /// Attempts per periodic pass before giving up until the next tick
    pub max_attempts: u32,
    /// First retry delay; doubles per attempt up to a fixed cap
    pub base_backoff: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            max_attempts: 5,
            base_backoff: Duration::from_secs(2),
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub const fn with_base_backoff(mut self, base_backoff: Duration) -> Self {
        self.base_backoff = base_backoff;
        self
    }
}

/// Exponential backoff delay for the given zero-based attempt.
#[must_use]
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2_u32.saturating_pow(attempt);
    base.saturating_mul(factor).min(MAX_BACKOFF)
}

/// What happened to a trigger request.
#[derive(Debug)]
pub enum TriggerOutcome {
    /// A cycle ran; per-type details inside
    Completed(CycleReport),
    /// Coalesced into the already-active run
    AlreadyRunning,
    /// No connectivity; skipped, to be retried on the next tick or trigger
    Offline,
    /// Credentials are stale; no run happens until re-authentication
    ReauthRequired,
}

/// Owns the sync cycle and serializes every way of starting it.
///
/// The cycle sits behind a `try_lock`ed mutex, so a trigger arriving while a
/// run is active coalesces into "already syncing" instead of racing the
/// active run's transactions. State changes are published on a watch channel.
pub struct SyncScheduler {
    cycle: Mutex<SyncCycle>,
    probe: Box<dyn ConnectivityProbe>,
    config: SchedulerConfig,
    state: watch::Sender<SyncStateSnapshot>,
    reauth_required: AtomicBool,
}

impl SyncScheduler {
    #[must_use]
    pub fn new(cycle: SyncCycle, probe: Box<dyn ConnectivityProbe>, config: SchedulerConfig) -> Self {
        let (state, _) = watch::channel(SyncStateSnapshot::default());
        Self {
            cycle: Mutex::new(cycle),
            probe,
            config,
            state,
            reauth_required: AtomicBool::new(false),
        }
    }

    /// Subscribe to sync-state snapshots.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncStateSnapshot> {
        self.state.subscribe()
    }

    /// The latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> SyncStateSnapshot {
        self.state.borrow().clone()
    }

    /// Whether runs are currently blocked on re-authentication.
    #[must_use]
    pub fn reauth_required(&self) -> bool {
        self.reauth_required.load(Ordering::Acquire)
    }

    /// Clear the re-authentication latch after credentials were refreshed.
    pub fn notify_reauthenticated(&self) {
        self.reauth_required.store(false, Ordering::Release);
        self.state.send_modify(|snapshot| {
            if snapshot.last_error == Some(SyncErrorKind::Authentication) {
                snapshot.last_error = None;
            }
        });
    }

    /// Re-publish pending-work counters without running a sync.
    pub async fn refresh_counts(&self) -> Result<StoreCounts> {
        let counts = self.cycle.lock().await.counts()?;
        self.state.send_modify(|snapshot| {
            snapshot.pending_uploads = counts.pending_uploads;
            snapshot.conflicts = counts.conflicts;
        });
        Ok(counts)
    }

    /// Run one user-initiated sync right now.
    ///
    /// Uploads pending local changes before any download pass. Coalesces
    /// with an active run instead of waiting for it.
    pub async fn trigger_now(&self, direction: SyncDirection) -> Result<TriggerOutcome> {
        if self.reauth_required() {
            return Ok(TriggerOutcome::ReauthRequired);
        }
        let Ok(mut cycle) = self.cycle.try_lock() else {
            tracing::debug!("Sync already running, trigger coalesced");
            return Ok(TriggerOutcome::AlreadyRunning);
        };
        if !self.probe.is_online().await {
            self.state
                .send_modify(|snapshot| snapshot.last_error = Some(SyncErrorKind::Offline));
            return Ok(TriggerOutcome::Offline);
        }

        self.state.send_modify(|snapshot| snapshot.is_syncing = true);
        match cycle.run_uploads_first(direction).await {
            Ok(report) => Ok(self.complete(&cycle, report)),
            Err(error) => self.abort(error),
        }
    }

    /// Run one periodic incremental pass, retrying transient failures with
    /// exponential backoff up to the configured attempt count.
    ///
    /// An offline probe skips the pass entirely; that is a reschedule, not
    /// a failure.
    pub async fn periodic_pass(&self) -> Result<TriggerOutcome> {
        if self.reauth_required() {
            return Ok(TriggerOutcome::ReauthRequired);
        }
        let Ok(mut cycle) = self.cycle.try_lock() else {
            return Ok(TriggerOutcome::AlreadyRunning);
        };
        if !self.probe.is_online().await {
            tracing::debug!("Offline, periodic sync skipped");
            self.state
                .send_modify(|snapshot| snapshot.last_error = Some(SyncErrorKind::Offline));
            return Ok(TriggerOutcome::Offline);
        }

        let mut attempt = 0_u32;
        loop {
            self.state.send_modify(|snapshot| snapshot.is_syncing = true);
            match cycle.run(SyncDirection::Incremental).await {
                Ok(report)
                    if report.has_transient_failures()
                        && attempt + 1 < self.config.max_attempts =>
                {
                    let delay = backoff_delay(self.config.base_backoff, attempt);
                    attempt += 1;
                    tracing::info!(
                        "Transient sync failure, retry {attempt}/{} in {delay:?}",
                        self.config.max_attempts
                    );
                    self.state.send_modify(|snapshot| {
                        snapshot.is_syncing = false;
                        snapshot.last_error = Some(SyncErrorKind::Network);
                    });
                    tokio::time::sleep(delay).await;
                }
                Ok(report) => return Ok(self.complete(&cycle, report)),
                Err(error) => return self.abort(error),
            }
        }
    }

    /// Periodic driver loop; spawn it as a background task.
    ///
    /// The first pass runs immediately, then once per configured interval.
    pub async fn run_periodic(&self) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.periodic_pass().await {
                Ok(TriggerOutcome::ReauthRequired) => {
                    tracing::debug!("Periodic sync idle until re-authentication");
                }
                Ok(_) => {}
                Err(error) => tracing::error!("Periodic sync failed: {error}"),
            }
        }
    }

    fn complete(&self, cycle: &SyncCycle, report: CycleReport) -> TriggerOutcome {
        let counts = match cycle.counts() {
            Ok(counts) => Some(counts),
            Err(error) => {
                tracing::warn!("Could not read pending-work counters: {error}");
                None
            }
        };
        let last_error = report
            .failures
            .first()
            .map(|failure| SyncErrorKind::from(&failure.error));
        let finished_at = chrono::Utc::now().timestamp_millis();
        let clean = report.is_clean();

        self.state.send_modify(|snapshot| {
            snapshot.is_syncing = false;
            if clean {
                snapshot.last_sync_time = Some(finished_at);
            }
            if let Some(counts) = counts {
                snapshot.pending_uploads = counts.pending_uploads;
                snapshot.conflicts = counts.conflicts;
            }
            snapshot.last_error = last_error;
        });

        TriggerOutcome::Completed(report)
    }

    fn abort(&self, error: Error) -> Result<TriggerOutcome> {
        let kind = SyncErrorKind::from(&error);
        self.state.send_modify(|snapshot| {
            snapshot.is_syncing = false;
            snapshot.last_error = Some(kind);
        });

        if matches!(error, Error::Authentication(_)) {
            tracing::warn!("Sync stopped until re-authentication: {error}");
            self.reauth_required.store(true, Ordering::Release);
            Ok(TriggerOutcome::ReauthRequired)
        } else {
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{EntityKind, VehicleGroup};
    use crate::store::memory::{MemoryRemoteStore, RemoteFault, StaticProbe};
    use crate::store::{LocalStore, SharedDatabase, SqliteStore};
    use crate::sync::orchestrator::{EntityRunner, EntitySync};
    use crate::sync::resolver::ConflictStrategy;
    use crate::sync::sequencer::DependencyGraph;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex as StdMutex};

    struct Fixture {
        db: SharedDatabase,
        remote: MemoryRemoteStore<VehicleGroup>,
        probe: StaticProbe,
        scheduler: SyncScheduler,
    }

    fn fixture(config: SchedulerConfig) -> Fixture {
        let db: SharedDatabase = Arc::new(StdMutex::new(Database::open_in_memory().unwrap()));
        let remote = MemoryRemoteStore::new();
        let probe = StaticProbe::new(true);

        let graph = DependencyGraph::new().with_node(EntityKind::VehicleGroups);
        let runners: Vec<Box<dyn EntityRunner>> = vec![Box::new(EntitySync::new(
            EntityKind::VehicleGroups,
            SqliteStore::new(Arc::clone(&db), EntityKind::VehicleGroups),
            remote.clone(),
            ConflictStrategy::LastWriteWins,
        ))];
        let cycle = SyncCycle::new(&graph, runners).unwrap();
        let scheduler = SyncScheduler::new(cycle, Box::new(probe.clone()), config);

        Fixture {
            db,
            remote,
            probe,
            scheduler,
        }
    }

    fn seed_pending(db: &SharedDatabase, name: &str) -> VehicleGroup {
        let group = VehicleGroup::new(name);
        let mut store: SqliteStore<VehicleGroup> =
            SqliteStore::new(Arc::clone(db), EntityKind::VehicleGroups);
        store
            .with_transaction(&mut |writer| writer.upsert(std::slice::from_ref(&group)))
            .unwrap();
        group
    }

    #[tokio::test]
    async fn test_trigger_runs_a_cycle_and_publishes_the_snapshot() {
        let fx = fixture(SchedulerConfig::default());
        seed_pending(&fx.db, "Hall 2");

        let outcome = fx
            .scheduler
            .trigger_now(SyncDirection::Full)
            .await
            .unwrap();

        let TriggerOutcome::Completed(report) = outcome else {
            panic!("expected a completed cycle");
        };
        assert!(report.is_clean());
        assert_eq!(report.total_uploaded(), 1);

        let snapshot = fx.scheduler.snapshot();
        assert!(!snapshot.is_syncing);
        assert!(snapshot.last_sync_time.is_some());
        assert_eq!(snapshot.pending_uploads, 0);
        assert_eq!(snapshot.last_error, None);
    }

    #[tokio::test]
    async fn test_offline_trigger_is_skipped_not_failed() {
        let fx = fixture(SchedulerConfig::default());
        seed_pending(&fx.db, "Hall 2");
        fx.probe.set_online(false);

        let outcome = fx
            .scheduler
            .trigger_now(SyncDirection::Full)
            .await
            .unwrap();

        assert!(matches!(outcome, TriggerOutcome::Offline));
        assert_eq!(fx.remote.push_count(), 0);
        assert_eq!(
            fx.scheduler.snapshot().last_error,
            Some(SyncErrorKind::Offline)
        );

        // Back online, the next trigger goes through
        fx.probe.set_online(true);
        let outcome = fx
            .scheduler
            .trigger_now(SyncDirection::Full)
            .await
            .unwrap();
        assert!(matches!(outcome, TriggerOutcome::Completed(_)));
    }

    #[tokio::test]
    async fn test_auth_failure_latches_until_reauthentication() {
        let fx = fixture(SchedulerConfig::default());
        seed_pending(&fx.db, "Hall 2");
        fx.remote.set_push_fault(RemoteFault::Authentication);

        let outcome = fx
            .scheduler
            .trigger_now(SyncDirection::Full)
            .await
            .unwrap();
        assert!(matches!(outcome, TriggerOutcome::ReauthRequired));
        assert!(fx.scheduler.reauth_required());
        assert_eq!(
            fx.scheduler.snapshot().last_error,
            Some(SyncErrorKind::Authentication)
        );

        // The latch, not the remote, blocks further runs
        fx.remote.set_push_fault(RemoteFault::None);
        let outcome = fx
            .scheduler
            .trigger_now(SyncDirection::Full)
            .await
            .unwrap();
        assert!(matches!(outcome, TriggerOutcome::ReauthRequired));

        fx.scheduler.notify_reauthenticated();
        assert_eq!(fx.scheduler.snapshot().last_error, None);
        let outcome = fx
            .scheduler
            .trigger_now(SyncDirection::Full)
            .await
            .unwrap();
        assert!(matches!(outcome, TriggerOutcome::Completed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_pass_retries_transient_failures_with_backoff() {
        let config = SchedulerConfig::default()
            .with_max_attempts(3)
            .with_base_backoff(Duration::from_millis(100));
        let fx = fixture(config);
        fx.remote.set_fetch_fault(RemoteFault::Network);

        let before = tokio::time::Instant::now();
        let outcome = fx.scheduler.periodic_pass().await.unwrap();
        let elapsed = before.elapsed();

        let TriggerOutcome::Completed(report) = outcome else {
            panic!("expected a completed (if failed) cycle");
        };
        assert!(!report.is_clean());
        assert!(report.has_transient_failures());
        // Two retries: 100ms + 200ms of virtual backoff
        assert!(elapsed >= Duration::from_millis(300));
        assert_eq!(
            fx.scheduler.snapshot().last_error,
            Some(SyncErrorKind::Network)
        );
    }

    #[tokio::test]
    async fn test_refresh_counts_publishes_without_syncing() {
        let fx = fixture(SchedulerConfig::default());
        seed_pending(&fx.db, "Hall 2");

        let counts = fx.scheduler.refresh_counts().await.unwrap();

        assert_eq!(counts.pending_uploads, 1);
        assert_eq!(fx.scheduler.snapshot().pending_uploads, 1);
        assert_eq!(fx.remote.push_count(), 0);
    }

    #[test]
    fn test_backoff_delay_doubles_and_caps() {
        let base = Duration::from_secs(2);
        assert_eq!(backoff_delay(base, 0), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 1), Duration::from_secs(4));
        assert_eq!(backoff_delay(base, 3), Duration::from_secs(16));
        assert_eq!(backoff_delay(base, 30), MAX_BACKOFF);
    }

    #[test]
    fn test_config_builders() {
        let config = SchedulerConfig::default()
            .with_interval(Duration::from_secs(60))
            .with_max_attempts(2);
        assert_eq!(config.interval, Duration::from_secs(60));
        assert_eq!(config.max_attempts, 2);
        assert_eq!(config.base_backoff, Duration::from_secs(2));
    }
}
