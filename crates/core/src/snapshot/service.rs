//! Snapshot manager: database create/drop and dump/load.
//!
//! Every operation shells out to the PostgreSQL client utilities through a
//! [`CommandRunner`]. The password travels in `PGPASSWORD`, never on argv.

use std::path::{Path, PathBuf};

use pgmgr_shared::Config;

use super::error::SnapshotError;
use super::runner::{CommandOutput, CommandRunner, CommandSpec};

/// Outcome of [`SnapshotManager::create_database`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The database was created.
    Created,
    /// A database with that name already existed.
    AlreadyExists,
}

/// Outcome of [`SnapshotManager::drop_database`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropOutcome {
    /// The database was dropped.
    Dropped,
    /// No database with that name existed.
    DidNotExist,
}

/// Runs snapshot operations for one configured database.
pub struct SnapshotManager<R: CommandRunner> {
    config: Config,
    runner: R,
}

impl<R: CommandRunner> SnapshotManager<R> {
    /// Create a new snapshot manager.
    #[must_use]
    pub fn new(config: Config, runner: R) -> Self {
        Self { config, runner }
    }

    /// The underlying runner.
    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Create the configured database with `createdb`.
    ///
    /// # Errors
    ///
    /// Returns an error if no database is configured, `createdb` cannot start,
    /// or it fails for any reason other than the database already existing.
    pub async fn create_database(&self) -> Result<CreateOutcome, SnapshotError> {
        let database = self.database()?;
        let spec = self.command("createdb").arg(database);

        let output = self.runner.run(&spec).await?;
        if output.success {
            tracing::info!(%database, "Database created");
            return Ok(CreateOutcome::Created);
        }
        if output.stderr.contains("already exists") {
            tracing::info!(%database, "Database already exists");
            return Ok(CreateOutcome::AlreadyExists);
        }
        Err(failed("create", &output))
    }

    /// Drop the configured database with `dropdb`.
    ///
    /// # Errors
    ///
    /// Returns an error if no database is configured, `dropdb` cannot start, or
    /// it fails for any reason other than the database not existing.
    pub async fn drop_database(&self) -> Result<DropOutcome, SnapshotError> {
        let database = self.database()?;
        let spec = self.command("dropdb").arg(database);

        let output = self.runner.run(&spec).await?;
        if output.success {
            tracing::info!(%database, "Database dropped");
            return Ok(DropOutcome::Dropped);
        }
        if output.stderr.contains("does not exist") {
            tracing::info!(%database, "Database does not exist");
            return Ok(DropOutcome::DidNotExist);
        }
        Err(failed("drop", &output))
    }

    /// Dump schema and data to the configured dump file.
    ///
    /// With seed tables configured, the schema of everything is dumped first,
    /// followed by the data of the matching tables and the bookkeeping table.
    ///
    /// # Errors
    ///
    /// Returns an error if no database is configured, `pg_dump` fails, or the
    /// dump file cannot be written.
    pub async fn dump(&self) -> Result<PathBuf, SnapshotError> {
        let database = self.database()?;

        let mut contents = Vec::new();
        if self.config.seed_tables.is_empty() {
            let spec = self.pg_dump().arg(database);
            contents.extend(self.run("dump", &spec).await?.stdout);
        } else {
            let schema = self.pg_dump().arg("--schema-only").arg(database);
            contents.extend(self.run("dump", &schema).await?.stdout);

            let mut data = self.pg_dump().arg("--data-only");
            for pattern in self
                .config
                .seed_tables
                .iter()
                .chain(std::iter::once(&self.config.migration_table))
            {
                data = data.arg("-t").arg(pattern.as_str());
            }
            contents.extend(self.run("dump", &data.arg(database)).await?.stdout);
        }

        let path = self.config.dump_file.clone();
        tokio::fs::write(&path, &contents)
            .await
            .map_err(|source| SnapshotError::Io {
                operation: "dump".to_string(),
                path: path.clone(),
                source,
            })?;

        tracing::info!(%database, file = %path.display(), bytes = contents.len(), "Database dumped");
        Ok(path)
    }

    /// Restore the configured dump file into the database with `psql`.
    ///
    /// # Errors
    ///
    /// Returns an error if no database is configured, the dump file does not
    /// exist, or `psql` fails on any statement.
    pub async fn load(&self) -> Result<(), SnapshotError> {
        let database = self.database()?;
        let path = &self.config.dump_file;
        if !path.is_file() {
            return Err(SnapshotError::DumpFileMissing(path.clone()));
        }

        let spec = self
            .command("psql")
            .args(["-v", "ON_ERROR_STOP=1", "-q"])
            .args(["-d", database])
            .arg("-f")
            .arg(path_arg(path));
        self.run("load", &spec).await?;

        tracing::info!(%database, file = %path.display(), "Database loaded");
        Ok(())
    }

    fn database(&self) -> Result<&str, SnapshotError> {
        self.config
            .require_database()
            .map_err(|_| SnapshotError::MissingDatabase)
    }

    fn pg_dump(&self) -> CommandSpec {
        self.command("pg_dump").args(["--no-owner", "--no-privileges"])
    }

    /// `program` with connection arguments and password environment applied.
    fn command(&self, program: &str) -> CommandSpec {
        let mut spec = CommandSpec::new(program)
            .args(["-h", self.config.host.as_str()])
            .arg("-p")
            .arg(self.config.port.to_string());
        if !self.config.username.is_empty() {
            spec = spec.args(["-U", self.config.username.as_str()]);
        }
        if !self.config.password.is_empty() {
            spec = spec.env("PGPASSWORD", self.config.password.as_str());
        }
        spec
    }

    async fn run(&self, operation: &str, spec: &CommandSpec) -> Result<CommandOutput, SnapshotError> {
        let output = self.runner.run(spec).await?;
        if output.success {
            Ok(output)
        } else {
            Err(failed(operation, &output))
        }
    }
}

fn failed(operation: &str, output: &CommandOutput) -> SnapshotError {
    tracing::error!(operation, status = %output.status(), "External command failed");
    SnapshotError::CommandFailed {
        operation: operation.to_string(),
        status: output.status(),
        stderr: output.stderr.trim().to_string(),
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
