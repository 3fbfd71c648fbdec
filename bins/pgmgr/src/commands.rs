//! Command execution and result messages.

use chrono::Utc;
use pgmgr_core::migration::{
    MigrateReport, MigrationRepository, MigrationService, MigrationStatus, RollbackOutcome,
    SchemaVersion,
};
use pgmgr_core::snapshot::{CreateOutcome, DropOutcome, ProcessRunner, SnapshotManager};
use pgmgr_db::PgMigrationTarget;
use pgmgr_shared::config::{config_file_path, load_config_file};
use pgmgr_shared::{Config, PgmgrError, PgmgrResult, load_config};

use crate::cli::{Command, DbCommand, GlobalArgs};

/// Resolve the effective configuration: config file, then environment and flags.
pub fn resolve_config(global: &GlobalArgs) -> PgmgrResult<Config> {
    let path = config_file_path(global);
    let existing = load_config_file(Config::default(), &path)?;
    Ok(load_config(existing, global)?)
}

/// Run one command and return the text to print on stdout.
pub async fn run(command: Command, config: Config) -> PgmgrResult<String> {
    match command {
        Command::Migration { name } => create_migration(&config, &name.join(" ")),
        Command::Config => print_config(&config),
        Command::Db { command } => run_db(command, config).await,
    }
}

async fn run_db(command: DbCommand, config: Config) -> PgmgrResult<String> {
    match command {
        DbCommand::Create => {
            let database = config.database.clone();
            let outcome = snapshots(config).create_database().await?;
            Ok(match outcome {
                CreateOutcome::Created => format!("Database {database} created successfully."),
                CreateOutcome::AlreadyExists => format!("Database {database} already exists."),
            })
        }
        DbCommand::Drop => {
            let database = config.database.clone();
            let outcome = snapshots(config).drop_database().await?;
            Ok(match outcome {
                DropOutcome::Dropped => format!("Database {database} dropped successfully."),
                DropOutcome::DidNotExist => format!("Database {database} does not exist."),
            })
        }
        DbCommand::Dump => {
            let path = snapshots(config).dump().await?;
            Ok(format!("Database dumped to {} successfully", path.display()))
        }
        DbCommand::Load => {
            snapshots(config.clone()).load().await?;
            let service = migrations(&config).await?;
            let current = service.version().await?;
            Ok(format!(
                "Database loaded successfully.\n{}",
                version_message(&config.migration_table, current)
            ))
        }
        DbCommand::Version => {
            let current = migrations(&config).await?.version().await?;
            Ok(version_message(&config.migration_table, current))
        }
        DbCommand::Migrate => {
            let report = migrations(&config).await?.migrate().await?;
            Ok(migrate_message(&report))
        }
        DbCommand::Rollback => {
            let outcome = migrations(&config).await?.rollback().await?;
            Ok(rollback_message(&outcome))
        }
        DbCommand::Status => {
            let status = migrations(&config).await?.status().await?;
            Ok(status_message(&config.migration_table, &status))
        }
    }
}

fn snapshots(config: Config) -> SnapshotManager<ProcessRunner> {
    SnapshotManager::new(config, ProcessRunner)
}

async fn migrations(config: &Config) -> PgmgrResult<MigrationService<PgMigrationTarget>> {
    let url = config.connection_url()?;
    let db = pgmgr_db::connect(&url)
        .await
        .map_err(|e| PgmgrError::from(pgmgr_db::classify(e)))?;
    tracing::debug!(host = %config.host, port = config.port, database = %config.database, "Connected to database");

    let target = PgMigrationTarget::new(db, &config.migration_table)?;
    Ok(MigrationService::new(
        MigrationRepository::new(&config.migration_folder),
        target,
    ))
}

fn create_migration(config: &Config, name: &str) -> PgmgrResult<String> {
    let created =
        MigrationRepository::new(&config.migration_folder).create(name, Utc::now())?;
    Ok(format!(
        "Created migration files:\n  {}\n  {}",
        created.up_path.display(),
        created.down_path.display()
    ))
}

fn print_config(config: &Config) -> PgmgrResult<String> {
    serde_json::to_string_pretty(&config.redacted())
        .map_err(|e| PgmgrError::Config(format!("failed to serialize configuration: {e}")))
}

/// Message for the schema state of the database.
pub fn version_message(table: &str, current: SchemaVersion) -> String {
    match current {
        SchemaVersion::Missing => {
            format!("Database has no {table} table; run `pgmgr db migrate` to create it.")
        }
        SchemaVersion::Empty => "No migrations have been applied yet.".to_string(),
        SchemaVersion::At(version) => format!("Latest migration version: {version}"),
    }
}

/// Message listing what a migrate run applied.
pub fn migrate_message(report: &MigrateReport) -> String {
    if report.is_empty() {
        return "No pending migrations.".to_string();
    }
    report
        .applied
        .iter()
        .map(|m| format!("Applied migration {} {}", m.version, m.name))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Message for a rollback outcome.
pub fn rollback_message(outcome: &RollbackOutcome) -> String {
    match outcome {
        RollbackOutcome::NothingToRollBack => "No migrations to roll back.".to_string(),
        RollbackOutcome::RolledBack(m) => format!("Rolled back migration {} {}", m.version, m.name),
    }
}

/// Message listing every known migration with its state.
pub fn status_message(table: &str, status: &MigrationStatus) -> String {
    let mut lines = vec![version_message(table, status.current)];
    lines.extend(status.entries.iter().map(|entry| {
        format!(
            "{:<16} {:<12} {}",
            entry.version,
            entry.state.to_string(),
            entry.name.as_deref().unwrap_or("-")
        )
    }));
    lines.join("\n")
}
