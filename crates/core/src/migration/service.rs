//! Migration executor.

use std::collections::{BTreeMap, HashSet};

use pgmgr_shared::Version;

use super::error::MigrationError;
use super::repository::MigrationRepository;
use super::types::{
    MigrateReport, Migration, MigrationState, MigrationStatus, RollbackOutcome, SchemaVersion,
    StatusEntry,
};

/// Port to the database that migrations are applied to.
///
/// This trait is implemented by the db crate on top of a live connection.
pub trait MigrationTarget: Send + Sync {
    /// Take the exclusive migration lock, waiting until it is free.
    fn lock(&self) -> impl std::future::Future<Output = Result<(), MigrationError>> + Send;

    /// Release the lock taken by [`MigrationTarget::lock`].
    fn unlock(&self) -> impl std::future::Future<Output = Result<(), MigrationError>> + Send;

    /// Create the bookkeeping table if it does not exist.
    fn ensure_table(&self) -> impl std::future::Future<Output = Result<(), MigrationError>> + Send;

    /// Read the schema state from the bookkeeping table.
    fn current_version(
        &self,
    ) -> impl std::future::Future<Output = Result<SchemaVersion, MigrationError>> + Send;

    /// List every applied version, ascending. Empty when the table is missing.
    fn applied_versions(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Version>, MigrationError>> + Send;

    /// Run the up script and record the version in one transaction.
    ///
    /// Must fail with [`MigrationError::AlreadyApplied`] when the version is
    /// already recorded, and with [`MigrationError::ApplyFailed`] when the
    /// script fails. Nothing is persisted on failure.
    fn apply(
        &self,
        migration: &Migration,
    ) -> impl std::future::Future<Output = Result<(), MigrationError>> + Send;

    /// Run the down script and delete the version's row in one transaction.
    ///
    /// Must fail with [`MigrationError::RevertFailed`] when the script fails.
    fn revert(
        &self,
        migration: &Migration,
    ) -> impl std::future::Future<Output = Result<(), MigrationError>> + Send;
}

/// Applies and rolls back migrations from a repository against a target.
pub struct MigrationService<T: MigrationTarget> {
    repo: MigrationRepository,
    target: T,
}

impl<T: MigrationTarget> MigrationService<T> {
    /// Create a new migration service.
    #[must_use]
    pub fn new(repo: MigrationRepository, target: T) -> Self {
        Self { repo, target }
    }

    /// The underlying target.
    pub fn target(&self) -> &T {
        &self.target
    }

    /// Apply every pending migration in ascending order.
    ///
    /// Pending means newer than the latest applied version. Unapplied versions
    /// older than that are reported as skipped and never applied. Each migration
    /// commits on its own, so a failure leaves earlier ones applied.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The lock or a bookkeeping query fails
    /// - The migration folder cannot be read
    /// - A migration fails (the run stops there)
    pub async fn migrate(&self) -> Result<MigrateReport, MigrationError> {
        self.target.lock().await?;
        let result = self.migrate_locked().await;
        self.release().await;
        result
    }

    async fn migrate_locked(&self) -> Result<MigrateReport, MigrationError> {
        self.target.ensure_table().await?;

        let latest = self.target.current_version().await?.latest();
        let applied: HashSet<Version> = self.target.applied_versions().await?.into_iter().collect();
        let migrations = self.repo.list()?;

        let mut report = MigrateReport::default();
        for migration in migrations {
            if latest.is_some_and(|latest| migration.version <= latest) {
                if !applied.contains(&migration.version) {
                    tracing::warn!(
                        version = %migration.version,
                        name = %migration.name,
                        "Skipping unapplied migration older than the latest applied version"
                    );
                    report.skipped.push(migration.version);
                }
                continue;
            }

            tracing::info!(version = %migration.version, name = %migration.name, "Applying migration");
            if let Err(e) = self.target.apply(&migration).await {
                tracing::error!(version = %migration.version, error = %e, "Migration failed");
                return Err(e);
            }
            report.applied.push(migration);
        }

        if report.is_empty() {
            tracing::info!("No pending migrations");
        } else {
            tracing::info!(count = report.applied.len(), "Migrations applied");
        }
        Ok(report)
    }

    /// Revert the migration with the highest applied version.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The lock or a bookkeeping query fails
    /// - The latest applied version has no file on disk
    /// - That migration has no down script (nothing is changed)
    /// - The down script fails
    pub async fn rollback(&self) -> Result<RollbackOutcome, MigrationError> {
        self.target.lock().await?;
        let result = self.rollback_locked().await;
        self.release().await;
        result
    }

    async fn rollback_locked(&self) -> Result<RollbackOutcome, MigrationError> {
        let Some(latest) = self.target.current_version().await?.latest() else {
            tracing::info!("No migrations to roll back");
            return Ok(RollbackOutcome::NothingToRollBack);
        };

        let migration = self
            .repo
            .list()?
            .into_iter()
            .find(|m| m.version == latest)
            .ok_or(MigrationError::MissingFile(latest))?;

        if !migration.is_reversible() {
            return Err(MigrationError::Irreversible {
                version: migration.version,
                name: migration.name,
            });
        }

        tracing::info!(version = %migration.version, name = %migration.name, "Rolling back migration");
        self.target.revert(&migration).await?;
        Ok(RollbackOutcome::RolledBack(migration))
    }

    /// Read the schema state of the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the bookkeeping query fails.
    pub async fn version(&self) -> Result<SchemaVersion, MigrationError> {
        self.target.current_version().await
    }

    /// List every known version with its state.
    ///
    /// # Errors
    ///
    /// Returns an error if a bookkeeping query fails or the folder cannot be read.
    pub async fn status(&self) -> Result<MigrationStatus, MigrationError> {
        let current = self.target.current_version().await?;
        let applied: HashSet<Version> = self.target.applied_versions().await?.into_iter().collect();
        let latest = current.latest();

        let mut entries: BTreeMap<Version, StatusEntry> = BTreeMap::new();
        for migration in self.repo.list()? {
            let state = if applied.contains(&migration.version) {
                MigrationState::Applied
            } else if latest.is_some_and(|latest| migration.version < latest) {
                MigrationState::Skipped
            } else {
                MigrationState::Pending
            };
            entries.insert(
                migration.version,
                StatusEntry {
                    version: migration.version,
                    name: Some(migration.name),
                    state,
                },
            );
        }
        for version in applied {
            entries.entry(version).or_insert(StatusEntry {
                version,
                name: None,
                state: MigrationState::MissingFile,
            });
        }

        Ok(MigrationStatus {
            current,
            entries: entries.into_values().collect(),
        })
    }

    async fn release(&self) {
        if let Err(e) = self.target.unlock().await {
            tracing::warn!(error = %e, "Failed to release migration lock");
        }
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
