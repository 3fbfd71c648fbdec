//! Migration domain types.

use std::fmt;
use std::path::PathBuf;

use pgmgr_shared::Version;

/// A versioned pair of SQL scripts discovered on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    /// Version parsed from the file name.
    pub version: Version,
    /// Descriptive name parsed from the file name.
    pub name: String,
    /// Forward script.
    pub up: String,
    /// Reverting script; `None` makes the migration irreversible.
    pub down: Option<String>,
    /// Path of the `.up.sql` file.
    pub up_path: PathBuf,
    /// Path of the `.down.sql` file, when present.
    pub down_path: Option<PathBuf>,
}

impl Migration {
    /// Whether this migration can be rolled back.
    #[must_use]
    pub fn is_reversible(&self) -> bool {
        self.down.is_some()
    }
}

impl fmt::Display for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.version, self.name)
    }
}

/// Which half of a migration a file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// `.up.sql`
    Up,
    /// `.down.sql`
    Down,
}

impl Direction {
    /// File name suffix for this half.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Up => "up.sql",
            Self::Down => "down.sql",
        }
    }
}

/// Schema state of the target database as seen through the bookkeeping table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    /// The bookkeeping table does not exist.
    Missing,
    /// The table exists but holds no rows.
    Empty,
    /// Latest applied version.
    At(Version),
}

impl SchemaVersion {
    /// Latest applied version, if any.
    #[must_use]
    pub const fn latest(self) -> Option<Version> {
        match self {
            Self::At(v) => Some(v),
            Self::Missing | Self::Empty => None,
        }
    }
}

/// Result of a `migrate` run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrateReport {
    /// Migrations applied by this run, ascending.
    pub applied: Vec<Migration>,
    /// Unapplied versions older than the latest applied one; never applied.
    pub skipped: Vec<Version>,
}

impl MigrateReport {
    /// Whether the run changed nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Result of a `rollback` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// No migration has been applied.
    NothingToRollBack,
    /// This migration was reverted and its row deleted.
    RolledBack(Migration),
}

/// Files written by `create`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedMigration {
    /// Generated version.
    pub version: Version,
    /// Sanitized name.
    pub name: String,
    /// Path of the new `.up.sql` file.
    pub up_path: PathBuf,
    /// Path of the new `.down.sql` file.
    pub down_path: PathBuf,
}

/// State of one version in a status listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    /// Recorded in the bookkeeping table.
    Applied,
    /// Newer than the latest applied version; `migrate` will apply it.
    Pending,
    /// Older than the latest applied version but never applied; `migrate` skips it.
    Skipped,
    /// Recorded as applied but no file exists for it.
    MissingFile,
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Applied => "applied",
            Self::Pending => "pending",
            Self::Skipped => "skipped",
            Self::MissingFile => "missing file",
        };
        f.write_str(label)
    }
}

/// One line of a status listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// Migration version.
    pub version: Version,
    /// Name from disk; `None` for [`MigrationState::MissingFile`].
    pub name: Option<String>,
    /// Current state.
    pub state: MigrationState,
}

/// Applied/pending overview of every known version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Schema state of the database.
    pub current: SchemaVersion,
    /// Every version on disk or in the bookkeeping table, ascending.
    pub entries: Vec<StatusEntry>,
}
