//! Versioned schema migrations.
//!
//! This module provides:
//! - Discovery of `<version>_<name>.{up,down}.sql` files
//! - Creation of new migration file pairs
//! - The apply/rollback executor over the [`MigrationTarget`] port

mod error;
mod repository;
mod service;
mod types;

#[cfg(test)]
mod fake;
#[cfg(test)]
mod ordering_props;

pub use error::MigrationError;
pub use repository::{MigrationRepository, ParsedFileName, parse_file_name, sanitize_name};
pub use service::{MigrationService, MigrationTarget};
pub use types::{
    CreatedMigration, Direction, MigrateReport, Migration, MigrationState, MigrationStatus,
    RollbackOutcome, SchemaVersion, StatusEntry,
};
