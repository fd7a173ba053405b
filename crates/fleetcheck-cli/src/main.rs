//! Fleetcheck CLI - offline-first vehicle and checklist tracking
//!
//! Records are editable offline at all times; `fleetcheck sync` reconciles
//! them against the server when connectivity allows.

use std::env;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::aot::Generator;
use clap_complete::{generate, shells};
use fleetcheck_core::db::Database;
use fleetcheck_core::models::{
    Checklist, ForeignKeyed, SyncMeta, SyncRecord, Vehicle, VehicleGroup,
};
use fleetcheck_core::store::{
    HttpProbe, HttpRemoteStore, LocalStore, RemoteConfig, SharedDatabase, SqliteStore, StoreCounts,
};
use fleetcheck_core::sync::{
    ConflictStrategy, DependencyGraph, EntityRunner, EntitySync, SchedulerConfig, SyncCycle,
    SyncDirection, SyncScheduler, TriggerOutcome,
};
use fleetcheck_core::{EntityKind, RecordId, SyncStatus};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Parser)]
#[command(name = "fleetcheck")]
#[command(about = "Track vehicles and checklists, online or offline")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Optional path to local database file
    #[arg(long, value_name = "PATH", global = true)]
    db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage vehicle groups
    Group {
        #[command(subcommand)]
        command: RecordCommands,
    },
    /// Manage vehicles
    Vehicle {
        #[command(subcommand)]
        command: VehicleCommands,
    },
    /// Manage checklists
    Checklist {
        #[command(subcommand)]
        command: ChecklistCommands,
    },
    /// Run one sync against the server
    Sync {
        /// Fetch the complete remote listing and reconcile deletions
        #[arg(long)]
        full: bool,
        /// Conflict strategy for records changed on both sides
        #[arg(long, value_enum, default_value_t = StrategyArg::LastWriteWins)]
        strategy: StrategyArg,
    },
    /// Show pending uploads and unresolved conflicts
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recently detected sync conflicts
    Conflicts {
        /// Number of conflicts to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Sync periodically in the foreground until interrupted
    Watch {
        /// Seconds between passes
        #[arg(long, default_value = "300")]
        interval: u64,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum RecordCommands {
    /// Create a record
    Add {
        /// Display name
        name: String,
    },
    /// List records
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark a record deleted (uploaded as a tombstone on the next sync)
    Delete {
        /// Record id
        id: String,
    },
}

#[derive(Subcommand)]
enum VehicleCommands {
    /// Register a vehicle in a group
    Add {
        /// Registration plate
        registration: String,
        /// Owning group id
        #[arg(long, value_name = "ID")]
        group: String,
    },
    /// List vehicles
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark a vehicle deleted (uploaded as a tombstone on the next sync)
    Delete {
        /// Vehicle id
        id: String,
    },
}

#[derive(Subcommand)]
enum ChecklistCommands {
    /// Create a checklist
    Add {
        /// Display name
        name: String,
        /// Optional owning group id
        #[arg(long, value_name = "ID")]
        group: Option<String>,
        /// Checklist step, repeatable
        #[arg(long = "item", value_name = "LABEL")]
        items: Vec<String>,
    },
    /// List checklists
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark a checklist deleted (uploaded as a tombstone on the next sync)
    Delete {
        /// Checklist id
        id: String,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum StrategyArg {
    LastWriteWins,
    RemoteWins,
    LocalWins,
    Manual,
}

impl From<StrategyArg> for ConflictStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::LastWriteWins => Self::LastWriteWins,
            StrategyArg::RemoteWins => Self::RemoteWins,
            StrategyArg::LocalWins => Self::LocalWins,
            StrategyArg::Manual => Self::Manual,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] fleetcheck_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No {0} found for id: {1}")]
    RecordNotFound(EntityKind, String),
    #[error(
        "Sync is not configured. Set FLEETCHECK_SERVER_URL (and FLEETCHECK_API_TOKEN if the server requires it)."
    )]
    SyncNotConfigured,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fleetcheck=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Commands::Group { command } => run_group(command, &db_path),
        Commands::Vehicle { command } => run_vehicle(command, &db_path),
        Commands::Checklist { command } => run_checklist(command, &db_path),
        Commands::Sync { full, strategy } => run_sync(full, strategy.into(), &db_path).await,
        Commands::Status { json } => run_status(json, &db_path),
        Commands::Conflicts { limit, json } => run_conflicts(limit, json, &db_path),
        Commands::Watch { interval } => run_watch(Duration::from_secs(interval), &db_path).await,
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref()),
    }
}

fn run_group(command: RecordCommands, db_path: &Path) -> Result<(), CliError> {
    let db = open_shared_db(db_path)?;
    match command {
        RecordCommands::Add { name } => {
            let group = VehicleGroup::new(name);
            upsert_record(&db, EntityKind::VehicleGroups, &group)?;
            println!("{}", group.id);
        }
        RecordCommands::List { json } => {
            let groups: Vec<VehicleGroup> = all_records(&db, EntityKind::VehicleGroups)?
                .into_iter()
                .filter(|group: &VehicleGroup| !group.is_deleted)
                .collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&groups)?);
            } else {
                for group in &groups {
                    println!("{}", format_record_line(&group.id, &group.name, group.meta));
                }
            }
        }
        RecordCommands::Delete { id } => {
            delete_record(&db, EntityKind::VehicleGroups, &id, |group: &VehicleGroup| {
                VehicleGroup {
                    is_deleted: true,
                    meta: group.meta.touched(),
                    ..group.clone()
                }
            })?;
        }
    }
    Ok(())
}

fn run_vehicle(command: VehicleCommands, db_path: &Path) -> Result<(), CliError> {
    let db = open_shared_db(db_path)?;
    match command {
        VehicleCommands::Add {
            registration,
            group,
        } => {
            let group_id = resolve_group_id(&db, &group)?;
            let vehicle = Vehicle::new(registration, group_id);
            upsert_record(&db, EntityKind::Vehicles, &vehicle)?;
            println!("{}", vehicle.id);
        }
        VehicleCommands::List { json } => {
            let vehicles: Vec<Vehicle> = all_records(&db, EntityKind::Vehicles)?
                .into_iter()
                .filter(|vehicle: &Vehicle| !vehicle.is_deleted)
                .collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&vehicles)?);
            } else {
                for vehicle in &vehicles {
                    println!(
                        "{}",
                        format_record_line(&vehicle.id, &vehicle.registration, vehicle.meta)
                    );
                }
            }
        }
        VehicleCommands::Delete { id } => {
            delete_record(&db, EntityKind::Vehicles, &id, |vehicle: &Vehicle| Vehicle {
                is_deleted: true,
                meta: vehicle.meta.touched(),
                ..vehicle.clone()
            })?;
        }
    }
    Ok(())
}

fn run_checklist(command: ChecklistCommands, db_path: &Path) -> Result<(), CliError> {
    let db = open_shared_db(db_path)?;
    match command {
        ChecklistCommands::Add { name, group, items } => {
            let group_id = group
                .map(|id| resolve_group_id(&db, &id))
                .transpose()?;
            let mut checklist = Checklist::new(name, group_id);
            for item in items {
                checklist = checklist.with_item(item, true);
            }
            upsert_record(&db, EntityKind::Checklists, &checklist)?;
            println!("{}", checklist.id);
        }
        ChecklistCommands::List { json } => {
            let checklists: Vec<Checklist> = all_records(&db, EntityKind::Checklists)?
                .into_iter()
                .filter(|checklist: &Checklist| !checklist.is_deleted)
                .collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&checklists)?);
            } else {
                for checklist in &checklists {
                    let label = format!("{} ({} steps)", checklist.name, checklist.items.len());
                    println!(
                        "{}",
                        format_record_line(&checklist.id, &label, checklist.meta)
                    );
                }
            }
        }
        ChecklistCommands::Delete { id } => {
            delete_record(&db, EntityKind::Checklists, &id, |checklist: &Checklist| {
                Checklist {
                    is_deleted: true,
                    meta: checklist.meta.touched(),
                    ..checklist.clone()
                }
            })?;
        }
    }
    Ok(())
}

async fn run_sync(
    full: bool,
    strategy: ConflictStrategy,
    db_path: &Path,
) -> Result<(), CliError> {
    let config = remote_config_from_env().ok_or(CliError::SyncNotConfigured)?;
    let db = open_shared_db(db_path)?;
    let scheduler = build_scheduler(&db, &config, strategy, SchedulerConfig::default())?;

    let direction = if full {
        SyncDirection::Full
    } else {
        SyncDirection::Incremental
    };

    match scheduler.trigger_now(direction).await? {
        TriggerOutcome::Completed(report) => {
            for entity_report in &report.reports {
                println!(
                    "{}: {} up, {} down, {} deleted, {} conflicted",
                    entity_report.entity,
                    entity_report.uploaded,
                    entity_report.downloaded,
                    entity_report.deleted,
                    entity_report.conflicts
                );
                for rejection in &entity_report.rejected {
                    println!("  rejected {}: {}", rejection.id, rejection.message);
                }
                for failed in &entity_report.failed_pushes {
                    println!("  push failed {}: {}", failed.id, failed.message);
                }
            }
            for failure in &report.failures {
                println!("{}: failed ({})", failure.entity, failure.error);
            }
            if report.total_conflicts() > 0 {
                println!(
                    "{} conflict(s) need resolution; see `fleetcheck conflicts`",
                    report.total_conflicts()
                );
            }
        }
        TriggerOutcome::Offline => println!("Offline, sync skipped"),
        TriggerOutcome::ReauthRequired => {
            println!("Authentication failed; refresh FLEETCHECK_API_TOKEN and retry");
        }
        TriggerOutcome::AlreadyRunning => println!("A sync is already running"),
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct StatusReport {
    pending_uploads: usize,
    conflicts: usize,
    entities: Vec<EntityStatus>,
}

#[derive(Debug, Serialize)]
struct EntityStatus {
    entity: String,
    pending_uploads: usize,
    conflicts: usize,
}

fn run_status(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_shared_db(db_path)?;

    let mut entities = Vec::new();
    let mut totals = StoreCounts::default();
    for kind in EntityKind::ALL {
        let counts = entity_counts(&db, kind)?;
        totals = totals.merged(counts);
        entities.push(EntityStatus {
            entity: kind.to_string(),
            pending_uploads: counts.pending_uploads,
            conflicts: counts.conflicts,
        });
    }

    let report = StatusReport {
        pending_uploads: totals.pending_uploads,
        conflicts: totals.conflicts,
        entities,
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for entity in &report.entities {
            println!(
                "{:<16} {} pending, {} conflicted",
                entity.entity, entity.pending_uploads, entity.conflicts
            );
        }
        println!(
            "total: {} pending upload(s), {} unresolved conflict(s)",
            report.pending_uploads, report.conflicts
        );
    }

    Ok(())
}

fn run_conflicts(limit: usize, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_shared_db(db_path)?;
    let conflicts = lock_db(&db)?.recent_conflicts(limit)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&conflicts)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts recorded");
        return Ok(());
    }

    for entry in &conflicts {
        let detected = chrono::DateTime::from_timestamp_millis(entry.detected_at)
            .map_or_else(|| entry.detected_at.to_string(), |at| at.to_rfc3339());
        println!(
            "{}  {} {}  local@{} remote@{}  {}",
            detected,
            entry.entity,
            entry.record_id,
            entry.local_modified_at,
            entry.remote_modified_at,
            entry.reason
        );
    }

    Ok(())
}

async fn run_watch(interval: Duration, db_path: &Path) -> Result<(), CliError> {
    let config = remote_config_from_env().ok_or(CliError::SyncNotConfigured)?;
    let db = open_shared_db(db_path)?;
    let scheduler = build_scheduler(
        &db,
        &config,
        ConflictStrategy::LastWriteWins,
        SchedulerConfig::default().with_interval(interval),
    )?;

    let mut updates = scheduler.subscribe();
    let printer = async {
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().clone();
            let state = if snapshot.is_syncing {
                "syncing".to_string()
            } else {
                snapshot
                    .last_error
                    .map_or_else(|| "idle".to_string(), |error| error.to_string())
            };
            println!(
                "[{state}] {} pending, {} conflicted",
                snapshot.pending_uploads, snapshot.conflicts
            );
        }
    };

    println!("Watching; syncing every {}s (Ctrl-C to stop)", interval.as_secs());
    tokio::join!(scheduler.run_periodic(), printer);
    Ok(())
}

fn run_completions(shell: CompletionShell, output_path: Option<&Path>) -> Result<(), CliError> {
    let mut command = Cli::command();
    let mut buffer = Vec::new();

    match shell {
        CompletionShell::Bash => generate_for_shell(shells::Bash, &mut command, &mut buffer),
        CompletionShell::Zsh => generate_for_shell(shells::Zsh, &mut command, &mut buffer),
        CompletionShell::Fish => generate_for_shell(shells::Fish, &mut command, &mut buffer),
    }

    if let Some(path) = output_path {
        std::fs::write(path, &buffer)?;
        println!("{}", path.display());
    } else {
        io::stdout().write_all(&buffer)?;
    }

    Ok(())
}

fn generate_for_shell<G: Generator>(
    generator: G,
    command: &mut clap::Command,
    buffer: &mut Vec<u8>,
) {
    generate(generator, command, "fleetcheck", buffer);
}

fn build_scheduler(
    db: &SharedDatabase,
    config: &RemoteConfig,
    strategy: ConflictStrategy,
    scheduler_config: SchedulerConfig,
) -> Result<SyncScheduler, CliError> {
    let graph = DependencyGraph::new()
        .with_dependency(EntityKind::Vehicles, EntityKind::VehicleGroups)
        .with_dependency(EntityKind::Checklists, EntityKind::VehicleGroups);

    let runners: Vec<Box<dyn EntityRunner>> = vec![
        build_runner::<VehicleGroup>(db, EntityKind::VehicleGroups, config, strategy)?,
        build_runner::<Vehicle>(db, EntityKind::Vehicles, config, strategy)?,
        build_runner::<Checklist>(db, EntityKind::Checklists, config, strategy)?,
    ];

    let cycle = SyncCycle::new(&graph, runners)?;
    let probe = HttpProbe::new(config)?;
    Ok(SyncScheduler::new(cycle, Box::new(probe), scheduler_config))
}

fn build_runner<R>(
    db: &SharedDatabase,
    entity: EntityKind,
    config: &RemoteConfig,
    strategy: ConflictStrategy,
) -> Result<Box<dyn EntityRunner>, CliError>
where
    R: ForeignKeyed + Serialize + DeserializeOwned,
{
    let local = SqliteStore::<R>::new(Arc::clone(db), entity);
    let remote = HttpRemoteStore::<R>::new(config.clone(), entity)?;
    Ok(Box::new(EntitySync::new(entity, local, remote, strategy)))
}

fn open_shared_db(path: &Path) -> Result<SharedDatabase, CliError> {
    Ok(Arc::new(Mutex::new(Database::open(path)?)))
}

fn lock_db(db: &SharedDatabase) -> Result<std::sync::MutexGuard<'_, Database>, CliError> {
    db.lock().map_err(|_| {
        CliError::Core(fleetcheck_core::Error::Storage(
            "database lock poisoned".to_string(),
        ))
    })
}

fn upsert_record<R>(db: &SharedDatabase, entity: EntityKind, record: &R) -> Result<(), CliError>
where
    R: SyncRecord + Serialize + DeserializeOwned,
{
    let mut store = SqliteStore::<R>::new(Arc::clone(db), entity);
    store.with_transaction(&mut |writer| writer.upsert(std::slice::from_ref(record)))?;
    Ok(())
}

fn all_records<R>(db: &SharedDatabase, entity: EntityKind) -> Result<Vec<R>, CliError>
where
    R: SyncRecord + Serialize + DeserializeOwned,
{
    let store = SqliteStore::<R>::new(Arc::clone(db), entity);
    Ok(store.get_all()?)
}

fn entity_counts(db: &SharedDatabase, entity: EntityKind) -> Result<StoreCounts, CliError> {
    // Counts only touch the shared metadata columns, so any record type works
    let store = SqliteStore::<VehicleGroup>::new(Arc::clone(db), entity);
    Ok(store.counts()?)
}

fn delete_record<R>(
    db: &SharedDatabase,
    entity: EntityKind,
    raw_id: &str,
    tombstone: impl FnOnce(&R) -> R,
) -> Result<(), CliError>
where
    R: SyncRecord + Serialize + DeserializeOwned,
{
    let id: RecordId = raw_id
        .parse()
        .map_err(|_| CliError::RecordNotFound(entity, raw_id.to_string()))?;
    let store = SqliteStore::<R>::new(Arc::clone(db), entity);
    let record = store
        .get_all()?
        .into_iter()
        .find(|record| record.record_id() == &id)
        .ok_or_else(|| CliError::RecordNotFound(entity, raw_id.to_string()))?;

    let deleted = tombstone(&record);
    upsert_record(db, entity, &deleted)?;
    println!("{id}");
    Ok(())
}

fn resolve_group_id(db: &SharedDatabase, raw_id: &str) -> Result<RecordId, CliError> {
    let id: RecordId = raw_id.parse().map_err(|_| {
        CliError::RecordNotFound(EntityKind::VehicleGroups, raw_id.to_string())
    })?;
    let groups = all_records::<VehicleGroup>(db, EntityKind::VehicleGroups)?;
    if groups.iter().any(|group| group.id == id && !group.is_deleted) {
        Ok(id)
    } else {
        Err(CliError::RecordNotFound(
            EntityKind::VehicleGroups,
            raw_id.to_string(),
        ))
    }
}

fn format_record_line(id: &RecordId, label: &str, meta: SyncMeta) -> String {
    let short_id = id.as_str().chars().take(13).collect::<String>();
    format!(
        "{short_id:<13}  {label:<32}  {}",
        format_status_label(meta.status)
    )
}

const fn format_status_label(status: SyncStatus) -> &'static str {
    match status {
        SyncStatus::Synced => "synced",
        SyncStatus::PendingUpload => "pending upload",
        SyncStatus::PendingDownload => "pending download",
        SyncStatus::Conflict => "CONFLICT",
    }
}

fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("FLEETCHECK_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fleetcheck")
        .join("fleetcheck.db")
}

fn remote_config_from_env() -> Option<RemoteConfig> {
    let url = env::var("FLEETCHECK_SERVER_URL").ok()?;
    if url.trim().is_empty() {
        return None;
    }
    let token = env::var("FLEETCHECK_API_TOKEN")
        .ok()
        .filter(|token| !token.trim().is_empty());
    RemoteConfig::new(url, token).ok()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;

    fn unique_test_db_path() -> PathBuf {
        static NEXT_TEST_DB_ID: AtomicU64 = AtomicU64::new(0);

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |duration| duration.as_nanos());
        let sequence = NEXT_TEST_DB_ID.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("fleetcheck-cli-test-{timestamp}-{sequence}.db"))
    }

    fn cleanup_db_files(path: &PathBuf) {
        let _ = std::fs::remove_file(path);
        let _ = std::fs::remove_file(path.with_extension("db-shm"));
        let _ = std::fs::remove_file(path.with_extension("db-wal"));
    }

    #[test]
    fn group_add_then_list_roundtrips() {
        let db_path = unique_test_db_path();

        run_group(
            RecordCommands::Add {
                name: "Hall 2".to_string(),
            },
            &db_path,
        )
        .unwrap();

        let db = open_shared_db(&db_path).unwrap();
        let groups = all_records::<VehicleGroup>(&db, EntityKind::VehicleGroups).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "Hall 2");
        assert_eq!(groups[0].meta.status, SyncStatus::PendingUpload);

        cleanup_db_files(&db_path);
    }

    #[test]
    fn vehicle_add_requires_existing_group() {
        let db_path = unique_test_db_path();

        let error = run_vehicle(
            VehicleCommands::Add {
                registration: "FL-RK 12".to_string(),
                group: RecordId::new().to_string(),
            },
            &db_path,
        )
        .unwrap_err();
        assert!(matches!(error, CliError::RecordNotFound(_, _)));

        cleanup_db_files(&db_path);
    }

    #[test]
    fn delete_marks_a_tombstone_instead_of_removing() {
        let db_path = unique_test_db_path();
        let db = open_shared_db(&db_path).unwrap();
        let group = VehicleGroup::new("Hall 2");
        upsert_record(&db, EntityKind::VehicleGroups, &group).unwrap();
        drop(db);

        run_group(
            RecordCommands::Delete {
                id: group.id.to_string(),
            },
            &db_path,
        )
        .unwrap();

        let db = open_shared_db(&db_path).unwrap();
        let groups = all_records::<VehicleGroup>(&db, EntityKind::VehicleGroups).unwrap();
        assert_eq!(groups.len(), 1);
        assert!(groups[0].is_deleted);
        assert_eq!(groups[0].meta.status, SyncStatus::PendingUpload);
        assert_eq!(groups[0].meta.version, group.meta.version + 1);

        cleanup_db_files(&db_path);
    }

    #[test]
    fn checklist_add_collects_items_in_order() {
        let db_path = unique_test_db_path();

        run_checklist(
            ChecklistCommands::Add {
                name: "Morning round".to_string(),
                group: None,
                items: vec!["Lights".to_string(), "Tyres".to_string()],
            },
            &db_path,
        )
        .unwrap();

        let db = open_shared_db(&db_path).unwrap();
        let checklists = all_records::<Checklist>(&db, EntityKind::Checklists).unwrap();
        assert_eq!(checklists[0].items.len(), 2);
        assert_eq!(checklists[0].items[1].label, "Tyres");
        assert_eq!(checklists[0].items[1].position, 1);

        cleanup_db_files(&db_path);
    }

    #[test]
    fn status_counts_pending_work_across_entity_types() {
        let db_path = unique_test_db_path();
        let db = open_shared_db(&db_path).unwrap();
        let group = VehicleGroup::new("Hall 2");
        upsert_record(&db, EntityKind::VehicleGroups, &group).unwrap();
        upsert_record(
            &db,
            EntityKind::Vehicles,
            &Vehicle::new("FL-RK 12", group.id.clone()),
        )
        .unwrap();

        let mut totals = StoreCounts::default();
        for kind in EntityKind::ALL {
            totals = totals.merged(entity_counts(&db, kind).unwrap());
        }
        assert_eq!(totals.pending_uploads, 2);
        assert_eq!(totals.conflicts, 0);

        cleanup_db_files(&db_path);
    }

    #[test]
    fn remote_config_requires_a_url() {
        // Only meaningful when the variables are unset in the test env
        if env::var_os("FLEETCHECK_SERVER_URL").is_none() {
            assert!(remote_config_from_env().is_none());
        }
    }

    #[test]
    fn status_labels_flag_conflicts_loudly() {
        assert_eq!(format_status_label(SyncStatus::Conflict), "CONFLICT");
        assert_eq!(format_status_label(SyncStatus::Synced), "synced");
    }

    #[test]
    fn record_line_truncates_the_id() {
        let group = VehicleGroup::new("Hall 2");
        let line = format_record_line(&group.id, &group.name, group.meta);
        assert!(line.starts_with(&group.id.as_str()[..13]));
        assert!(line.contains("Hall 2"));
        assert!(line.contains("pending upload"));
    }

    #[test]
    fn completions_write_a_bash_script() {
        let output_path = std::env::temp_dir().join(format!(
            "fleetcheck-completions-test-{}.bash",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |duration| duration.as_nanos())
        ));

        run_completions(CompletionShell::Bash, Some(&output_path)).unwrap();

        let script = std::fs::read_to_string(&output_path).unwrap();
        assert!(script.contains("_fleetcheck()"));

        let _ = std::fs::remove_file(output_path);
    }
}
