//! Command-line definition.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use pgmgr_shared::ArgSource;
use pgmgr_shared::config::keys;

/// PostgreSQL schema migration manager.
#[derive(Debug, Parser)]
#[command(name = "pgmgr", version, about = "PostgreSQL schema migration manager")]
pub struct Cli {
    /// Connection and folder settings.
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Operation to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Flags accepted by every command. Each overrides its `PGMGR_*` variable.
#[derive(Debug, Clone, Default, Args)]
pub struct GlobalArgs {
    /// JSON config file [default: .pgmgr.json]
    #[arg(short = 'c', long, global = true)]
    pub config_file: Option<PathBuf>,

    /// Database name
    #[arg(short = 'd', long, global = true)]
    pub database: Option<String>,

    /// Login role
    #[arg(short = 'u', long, global = true)]
    pub username: Option<String>,

    /// Login password
    #[arg(short = 'P', long, global = true)]
    pub password: Option<String>,

    /// Server host [default: localhost]
    #[arg(short = 'H', long, global = true)]
    pub host: Option<String>,

    /// Server port [default: 5432]
    #[arg(short = 'p', long, global = true)]
    pub port: Option<u16>,

    /// Connection URL or libpq DSN; overrides host, port, user, password and database
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// File written by `db dump` and read by `db load` [default: dump.sql]
    #[arg(long, global = true)]
    pub dump_file: Option<PathBuf>,

    /// Folder holding migration files [default: migrations]
    #[arg(long, global = true)]
    pub migration_folder: Option<PathBuf>,

    /// Bookkeeping table [default: schema_migrations]
    #[arg(long, global = true)]
    pub migration_table: Option<String>,

    /// Table glob whose data is included in dumps (repeatable or comma separated)
    #[arg(long, global = true, value_delimiter = ',')]
    pub seed_tables: Vec<String>,
}

/// Top-level commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a new up/down migration file pair
    Migration {
        /// Descriptive name; words are joined with '_'
        #[arg(required = true, num_args = 1..)]
        name: Vec<String>,
    },
    /// Print the effective configuration (password redacted)
    Config,
    /// Database operations
    Db {
        /// Database operation to run.
        #[command(subcommand)]
        command: DbCommand,
    },
}

/// Operations against the configured database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum DbCommand {
    /// Create the database
    Create,
    /// Drop the database
    Drop,
    /// Dump schema and data to the dump file
    Dump,
    /// Restore the dump file into the database
    Load,
    /// Show the latest applied migration version
    Version,
    /// Apply every pending migration
    Migrate,
    /// Revert the latest applied migration
    Rollback,
    /// List migrations with their applied state
    Status,
}

fn path_string(path: Option<&PathBuf>) -> Option<String> {
    path.map(|p| p.to_string_lossy().into_owned())
}

impl ArgSource for GlobalArgs {
    fn string(&self, key: &str) -> Option<String> {
        match key {
            keys::CONFIG_FILE => path_string(self.config_file.as_ref()),
            keys::DATABASE => self.database.clone(),
            keys::USERNAME => self.username.clone(),
            keys::PASSWORD => self.password.clone(),
            keys::HOST => self.host.clone(),
            keys::URL => self.url.clone(),
            keys::DUMP_FILE => path_string(self.dump_file.as_ref()),
            keys::MIGRATION_FOLDER => path_string(self.migration_folder.as_ref()),
            keys::MIGRATION_TABLE => self.migration_table.clone(),
            _ => None,
        }
    }

    fn int(&self, key: &str) -> Option<i64> {
        match key {
            keys::PORT => self.port.map(i64::from),
            _ => None,
        }
    }

    fn string_list(&self, key: &str) -> Vec<String> {
        match key {
            keys::SEED_TABLES => self.seed_tables.clone(),
            _ => Vec::new(),
        }
    }
}
