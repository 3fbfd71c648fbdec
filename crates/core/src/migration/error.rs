//! Migration error types.

use std::path::PathBuf;

use pgmgr_shared::{PgmgrError, Version};
use thiserror::Error;

/// Migration operation errors.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The migration folder does not exist.
    #[error("migration folder not found: {}", .0.display())]
    FolderNotFound(PathBuf),

    /// Reading or writing a migration file failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File or folder involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The requested migration name is empty or contains forbidden characters.
    #[error("invalid migration name '{0}': use letters, digits, '_' or '-'")]
    InvalidName(String),

    /// Two files claim the same version and half, or one version has two names.
    #[error("duplicate migration version {version}: {} and {}", first.display(), second.display())]
    DuplicateVersion {
        /// Conflicting version.
        version: Version,
        /// File seen first.
        first: PathBuf,
        /// File seen second.
        second: PathBuf,
    },

    /// A file that `create` would write already exists.
    #[error("migration file already exists: {}", .0.display())]
    FileExists(PathBuf),

    /// No version above the latest existing one fits in an `i64`.
    #[error("no migration version is available after {0}")]
    VersionExhausted(Version),

    /// The bookkeeping table name is not a valid SQL identifier.
    #[error("invalid migration table name '{0}'")]
    InvalidTable(String),

    /// The latest applied migration has no down script.
    #[error("migration {version} {name} is irreversible: no down script")]
    Irreversible {
        /// Version of the migration.
        version: Version,
        /// Name of the migration.
        name: String,
    },

    /// An applied version has no file in the migration folder.
    #[error("migration {0} is applied but has no file in the migration folder")]
    MissingFile(Version),

    /// The version is already recorded in the bookkeeping table.
    #[error("migration {0} is already applied")]
    AlreadyApplied(Version),

    /// The up script or its bookkeeping insert failed.
    #[error("migration {version} {name} failed: {message}")]
    ApplyFailed {
        /// Version of the failing migration.
        version: Version,
        /// Name of the failing migration.
        name: String,
        /// Underlying database error.
        message: String,
    },

    /// The down script or its bookkeeping delete failed.
    #[error("rollback of {version} {name} failed: {message}")]
    RevertFailed {
        /// Version of the failing migration.
        version: Version,
        /// Name of the failing migration.
        name: String,
        /// Underlying database error.
        message: String,
    },

    /// The server could not be reached.
    #[error("connection error: {0}")]
    Connection(String),

    /// Any other database failure (bookkeeping query, lock).
    #[error("database error: {0}")]
    Database(String),
}

impl MigrationError {
    /// Create an I/O error for `path`.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a database error.
    #[must_use]
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }
}

impl From<MigrationError> for PgmgrError {
    fn from(err: MigrationError) -> Self {
        match err {
            MigrationError::FolderNotFound(_)
            | MigrationError::Io { .. }
            | MigrationError::InvalidName(_)
            | MigrationError::DuplicateVersion { .. }
            | MigrationError::FileExists(_)
            | MigrationError::VersionExhausted(_) => Self::Repository(err.to_string()),
            MigrationError::InvalidTable(_) => Self::Config(err.to_string()),
            MigrationError::Irreversible { .. }
            | MigrationError::MissingFile(_)
            | MigrationError::AlreadyApplied(_) => Self::MigrationOrder(err.to_string()),
            MigrationError::ApplyFailed {
                version,
                ref name,
                ref message,
            }
            | MigrationError::RevertFailed {
                version,
                ref name,
                ref message,
            } => Self::MigrationApply {
                version,
                message: format!("{name}: {message}"),
            },
            MigrationError::Connection(msg) => Self::Connection(msg),
            MigrationError::Database(msg) => Self::Database(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_mapping() {
        let cases: Vec<(MigrationError, &str)> = vec![
            (MigrationError::FolderNotFound("m".into()), "REPOSITORY_ERROR"),
            (MigrationError::InvalidName("a b".into()), "REPOSITORY_ERROR"),
            (MigrationError::VersionExhausted(Version(i64::MAX)), "REPOSITORY_ERROR"),
            (MigrationError::InvalidTable("x;y".into()), "CONFIG_ERROR"),
            (
                MigrationError::Irreversible {
                    version: Version(1),
                    name: "init".into(),
                },
                "MIGRATION_ORDER_ERROR",
            ),
            (MigrationError::MissingFile(Version(2)), "MIGRATION_ORDER_ERROR"),
            (
                MigrationError::ApplyFailed {
                    version: Version(3),
                    name: "broken".into(),
                    message: "syntax error".into(),
                },
                "MIGRATION_APPLY_ERROR",
            ),
            (MigrationError::Connection("refused".into()), "CONNECTION_ERROR"),
            (MigrationError::database("lock"), "DATABASE_ERROR"),
        ];

        for (err, code) in cases {
            let mapped: PgmgrError = err.into();
            assert_eq!(mapped.error_code(), code, "{mapped}");
        }
    }

    #[test]
    fn test_apply_failure_keeps_version() {
        let mapped: PgmgrError = MigrationError::ApplyFailed {
            version: Version(20_260_101_000_000),
            name: "add_users".into(),
            message: "relation exists".into(),
        }
        .into();

        assert_eq!(
            mapped.to_string(),
            "Migration 20260101000000 failed: add_users: relation exists"
        );
    }
}
