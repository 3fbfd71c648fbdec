//! Snapshot error types.

use std::path::PathBuf;

use pgmgr_shared::PgmgrError;
use thiserror::Error;

/// Snapshot operation errors.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// No database name was configured.
    #[error("database name is not set")]
    MissingDatabase,

    /// The utility could not be started (usually not installed or not on PATH).
    #[error("failed to start {program}: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The utility exited unsuccessfully.
    #[error("{operation} exited with {status}: {stderr}")]
    CommandFailed {
        /// Operation being performed (e.g. "dump").
        operation: String,
        /// Exit status description.
        status: String,
        /// Captured standard error, trimmed.
        stderr: String,
    },

    /// `load` was asked to read a dump file that does not exist.
    #[error("dump file not found: {}", .0.display())]
    DumpFileMissing(PathBuf),

    /// Reading or writing the dump file failed.
    #[error("{operation}: I/O error on {}: {source}", path.display())]
    Io {
        /// Operation being performed.
        operation: String,
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl SnapshotError {
    /// Operation name used when reporting this error.
    #[must_use]
    pub fn operation(&self) -> &str {
        match self {
            Self::MissingDatabase => "configuration",
            Self::Spawn { program, .. } => program.as_str(),
            Self::CommandFailed { operation, .. } | Self::Io { operation, .. } => operation.as_str(),
            Self::DumpFileMissing(_) => "load",
        }
    }
}

impl From<SnapshotError> for PgmgrError {
    fn from(err: SnapshotError) -> Self {
        match err {
            SnapshotError::MissingDatabase => {
                Self::Config(pgmgr_shared::ConfigError::MissingDatabase.to_string())
            }
            SnapshotError::CommandFailed {
                operation,
                status,
                stderr,
            } => Self::ExternalProcess {
                operation,
                message: if stderr.is_empty() {
                    status
                } else {
                    format!("{status}: {stderr}")
                },
            },
            other => Self::ExternalProcess {
                operation: other.operation().to_string(),
                message: other.to_string(),
            },
        }
    }
}
