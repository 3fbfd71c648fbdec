//! Database snapshots through the PostgreSQL client utilities.

mod error;
mod runner;
mod service;

#[cfg(test)]
mod tests;

pub use error::SnapshotError;
pub use runner::{CommandOutput, CommandRunner, CommandSpec, ProcessRunner};
pub use service::{CreateOutcome, DropOutcome, SnapshotManager};
