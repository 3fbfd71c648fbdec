//! PostgreSQL layer for pgmgr.
//!
//! This crate provides:
//! - The single-session connection used for migrations
//! - Bookkeeping table access ([`VersionTracker`])
//! - The advisory lock serializing concurrent runs
//! - [`PgMigrationTarget`], the live implementation of the core migration port

pub mod lock;
pub mod target;
pub mod tracker;

use std::time::Duration;

pub use lock::AdvisoryLock;
pub use target::PgMigrationTarget;
pub use tracker::{TableName, VersionTracker};

use pgmgr_core::migration::MigrationError;
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};

/// Establishes a single-connection pool to the database.
///
/// Exactly one physical connection is kept open for the lifetime of the pool
/// so that the advisory lock and every transaction run in the same session.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(database_url);
    opt.min_connections(1)
        .max_connections(1)
        .idle_timeout(Duration::from_secs(24 * 60 * 60))
        .max_lifetime(Duration::from_secs(24 * 60 * 60))
        .sqlx_logging(false);

    Database::connect(opt).await
}

/// Sort a database error into the migration error taxonomy.
#[must_use]
pub fn classify(err: DbErr) -> MigrationError {
    match err {
        DbErr::Conn(e) => MigrationError::Connection(e.to_string()),
        DbErr::ConnectionAcquire(e) => MigrationError::Connection(e.to_string()),
        other => MigrationError::Database(other.to_string()),
    }
}
