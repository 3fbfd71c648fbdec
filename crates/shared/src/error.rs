//! Application-wide error taxonomy.
//!
//! Every module error converts into one of these categories before it reaches
//! the command line, which prints a single diagnostic and exits non-zero.

use thiserror::Error;

use crate::config::ConfigError;
use crate::types::Version;

/// Result type alias using `PgmgrError`.
pub type PgmgrResult<T> = Result<T, PgmgrError>;

/// Application error categories.
#[derive(Debug, Error)]
pub enum PgmgrError {
    /// Malformed connection URL, unreadable config file, missing database name.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The database server could not be reached or refused authentication.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A rollback cannot proceed, or a migration would be applied out of order.
    #[error("Migration order error: {0}")]
    MigrationOrder(String),

    /// A migration script failed; the run stopped at this version.
    #[error("Migration {version} failed: {message}")]
    MigrationApply {
        /// Version of the failing migration.
        version: Version,
        /// Underlying database error.
        message: String,
    },

    /// An external database utility exited unsuccessfully.
    #[error("{operation} failed: {message}")]
    ExternalProcess {
        /// Operation that was being performed (e.g. "dump").
        operation: String,
        /// Exit status and captured stderr.
        message: String,
    },

    /// The migration folder could not be read or contains invalid files.
    #[error("Migration repository error: {0}")]
    Repository(String),

    /// Any other database failure.
    #[error("Database error: {0}")]
    Database(String),
}

impl PgmgrError {
    /// Returns a stable error code for this category.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Connection(_) => "CONNECTION_ERROR",
            Self::MigrationOrder(_) => "MIGRATION_ORDER_ERROR",
            Self::MigrationApply { .. } => "MIGRATION_APPLY_ERROR",
            Self::ExternalProcess { .. } => "EXTERNAL_PROCESS_ERROR",
            Self::Repository(_) => "REPOSITORY_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }

    /// Returns the process exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        1
    }
}

impl From<ConfigError> for PgmgrError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
