//! [`MigrationTarget`] backed by a live PostgreSQL connection.

use pgmgr_core::migration::{Migration, MigrationError, MigrationTarget, SchemaVersion};
use pgmgr_shared::Version;
use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, TransactionTrait};

use crate::classify;
use crate::lock::AdvisoryLock;
use crate::tracker::{TableName, VersionTracker};

/// Applies migrations over a single-connection pool.
pub struct PgMigrationTarget {
    db: DatabaseConnection,
    tracker: VersionTracker,
    lock: AdvisoryLock,
}

impl PgMigrationTarget {
    /// Create a target for `db`, tracking applied versions in `table`.
    ///
    /// `db` must come from [`crate::connect`] so the lock and every transaction
    /// share one session.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::InvalidTable`] if `table` is not a valid identifier.
    pub fn new(db: DatabaseConnection, table: &str) -> Result<Self, MigrationError> {
        let table = TableName::parse(table)?;
        Ok(Self {
            db,
            lock: AdvisoryLock::for_table(&table),
            tracker: VersionTracker::new(table),
        })
    }

    /// The bookkeeping table tracker.
    #[must_use]
    pub fn tracker(&self) -> &VersionTracker {
        &self.tracker
    }

    /// The underlying connection.
    #[must_use]
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

fn apply_failed(migration: &Migration, err: &DbErr) -> MigrationError {
    MigrationError::ApplyFailed {
        version: migration.version,
        name: migration.name.clone(),
        message: err.to_string(),
    }
}

fn revert_failed(migration: &Migration, err: &DbErr) -> MigrationError {
    MigrationError::RevertFailed {
        version: migration.version,
        name: migration.name.clone(),
        message: err.to_string(),
    }
}

impl MigrationTarget for PgMigrationTarget {
    async fn lock(&self) -> Result<(), MigrationError> {
        self.lock.acquire(&self.db).await.map_err(classify)
    }

    async fn unlock(&self) -> Result<(), MigrationError> {
        self.lock.release(&self.db).await.map_err(classify)
    }

    async fn ensure_table(&self) -> Result<(), MigrationError> {
        self.tracker.ensure_table(&self.db).await.map_err(classify)
    }

    async fn current_version(&self) -> Result<SchemaVersion, MigrationError> {
        self.tracker.current_version(&self.db).await.map_err(classify)
    }

    async fn applied_versions(&self) -> Result<Vec<Version>, MigrationError> {
        self.tracker.applied_versions(&self.db).await.map_err(classify)
    }

    async fn apply(&self, migration: &Migration) -> Result<(), MigrationError> {
        let failed = |err: DbErr| apply_failed(migration, &err);

        let txn = self.db.begin().await.map_err(classify)?;

        if self
            .tracker
            .is_applied(&txn, migration.version)
            .await
            .map_err(classify)?
        {
            txn.rollback().await.map_err(classify)?;
            return Err(MigrationError::AlreadyApplied(migration.version));
        }

        if migration.up.trim().is_empty() {
            tracing::debug!(version = %migration.version, "Up script is empty; recording only");
        } else {
            txn.execute_unprepared(&migration.up).await.map_err(failed)?;
        }
        self.tracker
            .record_applied(&txn, migration.version)
            .await
            .map_err(failed)?;
        txn.commit().await.map_err(failed)?;

        tracing::info!(version = %migration.version, name = %migration.name, "Migration applied");
        Ok(())
    }

    async fn revert(&self, migration: &Migration) -> Result<(), MigrationError> {
        let failed = |err: DbErr| revert_failed(migration, &err);
        let Some(down) = migration.down.as_deref() else {
            return Err(MigrationError::Irreversible {
                version: migration.version,
                name: migration.name.clone(),
            });
        };

        let txn = self.db.begin().await.map_err(classify)?;
        txn.execute_unprepared(down).await.map_err(failed)?;
        self.tracker
            .record_rolled_back(&txn, migration.version)
            .await
            .map_err(failed)?;
        txn.commit().await.map_err(failed)?;

        tracing::info!(version = %migration.version, name = %migration.name, "Migration rolled back");
        Ok(())
    }
}
