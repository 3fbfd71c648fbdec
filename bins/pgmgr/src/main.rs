//! pgmgr - PostgreSQL schema migration manager.
//!
//! Usage:
//!   pgmgr migration <name>   - Create an up/down migration file pair
//!   pgmgr config             - Print the effective configuration
//!   pgmgr db create|drop     - Create or drop the database
//!   pgmgr db dump|load       - Dump to or restore from the dump file
//!   pgmgr db version|status  - Show the applied migration state
//!   pgmgr db migrate         - Apply every pending migration
//!   pgmgr db rollback        - Revert the latest applied migration

mod cli;
mod commands;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Cli;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Logs go to stderr; stdout carries only command results
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pgmgr=info,sea_orm=warn,sqlx=warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();

    let result = match commands::resolve_config(&cli.global) {
        Ok(config) => commands::run(cli.command, config).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::debug!(code = e.error_code(), "Command failed");
            eprintln!("Error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}
