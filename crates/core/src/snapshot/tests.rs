//! Snapshot manager tests against a scripted runner.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

use pgmgr_shared::{Config, PgmgrError};
use tempfile::TempDir;

use super::*;

/// Replays canned outputs and records every command it was asked to run.
#[derive(Default)]
struct ScriptedRunner {
    outputs: Mutex<VecDeque<CommandOutput>>,
    seen: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    fn replying(outputs: Vec<CommandOutput>) -> Self {
        Self {
            outputs: Mutex::new(outputs.into()),
            seen: Mutex::default(),
        }
    }

    fn seen(&self) -> Vec<CommandSpec> {
        self.seen.lock().unwrap().clone()
    }
}

impl CommandRunner for ScriptedRunner {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, SnapshotError> {
        self.seen.lock().unwrap().push(command.clone());
        Ok(self
            .outputs
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ok(b"")))
    }
}

fn ok(stdout: &[u8]) -> CommandOutput {
    CommandOutput {
        success: true,
        code: Some(0),
        stdout: stdout.to_vec(),
        stderr: String::new(),
    }
}

fn fail(stderr: &str) -> CommandOutput {
    CommandOutput {
        success: false,
        code: Some(1),
        stdout: Vec::new(),
        stderr: stderr.to_string(),
    }
}

fn config(dump_file: PathBuf) -> Config {
    Config {
        database: "app".into(),
        username: "admin".into(),
        password: "secret".into(),
        host: "db.local".into(),
        port: 5433,
        dump_file,
        migration_table: "schema_migrations".into(),
        ..Config::default()
    }
}

fn manager(config: Config, outputs: Vec<CommandOutput>) -> SnapshotManager<ScriptedRunner> {
    SnapshotManager::new(config, ScriptedRunner::replying(outputs))
}

#[tokio::test]
async fn test_create_database_passes_connection_and_password_env() {
    let mgr = manager(config("dump.sql".into()), vec![ok(b"")]);

    assert_eq!(mgr.create_database().await.unwrap(), CreateOutcome::Created);

    let seen = mgr.runner().seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].program, "createdb");
    assert_eq!(
        seen[0].args,
        vec!["-h", "db.local", "-p", "5433", "-U", "admin", "app"]
    );
    assert_eq!(seen[0].env, vec![("PGPASSWORD".to_string(), "secret".to_string())]);
    assert!(!seen[0].to_string().contains("secret"));
}

#[tokio::test]
async fn test_create_database_already_exists() {
    let mgr = manager(
        config("dump.sql".into()),
        vec![fail("createdb: error: database creation failed: ERROR:  database \"app\" already exists")],
    );

    assert_eq!(mgr.create_database().await.unwrap(), CreateOutcome::AlreadyExists);
}

#[tokio::test]
async fn test_create_database_other_failure() {
    let mgr = manager(config("dump.sql".into()), vec![fail("permission denied to create database\n")]);

    let err = mgr.create_database().await.unwrap_err();

    assert!(matches!(
        &err,
        SnapshotError::CommandFailed { operation, stderr, .. }
            if operation == "create" && stderr == "permission denied to create database"
    ));
    let mapped: PgmgrError = err.into();
    assert_eq!(mapped.error_code(), "EXTERNAL_PROCESS_ERROR");
}

#[tokio::test]
async fn test_drop_database_outcomes() {
    let dropped = manager(config("dump.sql".into()), vec![ok(b"")]);
    assert_eq!(dropped.drop_database().await.unwrap(), DropOutcome::Dropped);
    assert_eq!(dropped.runner().seen()[0].program, "dropdb");

    let missing = manager(
        config("dump.sql".into()),
        vec![fail("dropdb: error: database removal failed: ERROR:  database \"app\" does not exist")],
    );
    assert_eq!(missing.drop_database().await.unwrap(), DropOutcome::DidNotExist);
}

#[tokio::test]
async fn test_missing_database_is_error() {
    let cfg = Config {
        database: String::new(),
        ..config("dump.sql".into())
    };
    let mgr = manager(cfg, vec![]);

    assert!(matches!(
        mgr.create_database().await,
        Err(SnapshotError::MissingDatabase)
    ));
    assert!(mgr.runner().seen().is_empty());
}

#[tokio::test]
async fn test_dump_full() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dump.sql");
    let mgr = manager(config(path.clone()), vec![ok(b"CREATE TABLE t ();\n")]);

    assert_eq!(mgr.dump().await.unwrap(), path);

    let seen = mgr.runner().seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].program, "pg_dump");
    assert_eq!(
        seen[0].args,
        vec![
            "-h", "db.local", "-p", "5433", "-U", "admin", "--no-owner", "--no-privileges", "app"
        ]
    );
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "CREATE TABLE t ();\n");
}

#[tokio::test]
async fn test_dump_with_seed_tables() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("seed.sql");
    let cfg = Config {
        seed_tables: vec!["users".into(), "lookup_*".into()],
        ..config(path.clone())
    };
    let mgr = manager(cfg, vec![ok(b"-- schema\n"), ok(b"-- data\n")]);

    mgr.dump().await.unwrap();

    let seen = mgr.runner().seen();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].args.contains(&"--schema-only".to_string()));
    assert_eq!(
        seen[1].args[seen[1].args.len() - 8..],
        [
            "--data-only",
            "-t",
            "users",
            "-t",
            "lookup_*",
            "-t",
            "schema_migrations",
            "app"
        ]
    );
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "-- schema\n-- data\n");
}

#[tokio::test]
async fn test_dump_failure_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dump.sql");
    let mgr = manager(config(path.clone()), vec![fail("connection refused")]);

    assert!(matches!(
        mgr.dump().await,
        Err(SnapshotError::CommandFailed { ref operation, .. }) if operation == "dump"
    ));
    assert!(!path.exists());
}

#[tokio::test]
async fn test_load_runs_psql() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dump.sql");
    std::fs::write(&path, "SELECT 1;").unwrap();
    let cfg = Config {
        username: String::new(),
        password: String::new(),
        ..config(path.clone())
    };
    let mgr = manager(cfg, vec![ok(b"")]);

    mgr.load().await.unwrap();

    let seen = mgr.runner().seen();
    assert_eq!(seen[0].program, "psql");
    let file = path.to_string_lossy().into_owned();
    assert_eq!(
        seen[0].args,
        vec![
            "-h", "db.local", "-p", "5433", "-v", "ON_ERROR_STOP=1", "-q", "-d", "app", "-f",
            file.as_str()
        ]
    );
    assert!(seen[0].env.is_empty());
}

#[tokio::test]
async fn test_load_missing_dump_file() {
    let dir = TempDir::new().unwrap();
    let mgr = manager(config(dir.path().join("absent.sql")), vec![]);

    assert!(matches!(
        mgr.load().await,
        Err(SnapshotError::DumpFileMissing(_))
    ));
    assert!(mgr.runner().seen().is_empty());
}

#[tokio::test]
async fn test_load_failure_reports_stderr() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dump.sql");
    std::fs::write(&path, "bogus;").unwrap();
    let mgr = manager(config(path), vec![fail("ERROR:  syntax error at or near \"bogus\"")]);

    let err: PgmgrError = mgr.load().await.unwrap_err().into();

    assert_eq!(
        err.to_string(),
        "load failed: exit status 1: ERROR:  syntax error at or near \"bogus\""
    );
}

#[tokio::test]
async fn test_process_runner_reports_spawn_failure() {
    let spec = CommandSpec::new("pgmgr-definitely-not-a-real-binary");

    let err = ProcessRunner.run(&spec).await.unwrap_err();

    assert!(matches!(err, SnapshotError::Spawn { .. }));
}
