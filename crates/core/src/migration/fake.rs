//! In-memory [`MigrationTarget`] for executor tests.

use std::collections::{BTreeSet, HashSet};
use std::sync::Mutex;

use pgmgr_shared::Version;

use super::error::MigrationError;
use super::service::MigrationTarget;
use super::types::{Migration, SchemaVersion};

#[derive(Debug, Default)]
pub struct FakeState {
    pub table_exists: bool,
    pub applied: BTreeSet<Version>,
    pub executed: Vec<String>,
    pub failing: HashSet<Version>,
    pub locked: bool,
    pub lock_calls: usize,
}

/// Records every call; scripts "fail" when their version is in `failing`.
#[derive(Debug, Default)]
pub struct FakeTarget {
    pub state: Mutex<FakeState>,
}

impl FakeTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_applied(versions: &[i64]) -> Self {
        let target = Self::new();
        {
            let mut state = target.state.lock().unwrap();
            state.table_exists = true;
            state.applied = versions.iter().copied().map(Version).collect();
        }
        target
    }

    pub fn fail_on(self, version: i64) -> Self {
        self.state.lock().unwrap().failing.insert(Version(version));
        self
    }

    pub fn applied(&self) -> Vec<i64> {
        self.state.lock().unwrap().applied.iter().map(|v| v.0).collect()
    }

    pub fn executed(&self) -> Vec<String> {
        self.state.lock().unwrap().executed.clone()
    }

    pub fn is_locked(&self) -> bool {
        self.state.lock().unwrap().locked
    }

    pub fn lock_calls(&self) -> usize {
        self.state.lock().unwrap().lock_calls
    }
}

impl MigrationTarget for FakeTarget {
    async fn lock(&self) -> Result<(), MigrationError> {
        let mut state = self.state.lock().unwrap();
        assert!(!state.locked, "lock taken twice");
        state.locked = true;
        state.lock_calls += 1;
        Ok(())
    }

    async fn unlock(&self) -> Result<(), MigrationError> {
        self.state.lock().unwrap().locked = false;
        Ok(())
    }

    async fn ensure_table(&self) -> Result<(), MigrationError> {
        self.state.lock().unwrap().table_exists = true;
        Ok(())
    }

    async fn current_version(&self) -> Result<SchemaVersion, MigrationError> {
        let state = self.state.lock().unwrap();
        Ok(if !state.table_exists {
            SchemaVersion::Missing
        } else {
            state
                .applied
                .last()
                .copied()
                .map_or(SchemaVersion::Empty, SchemaVersion::At)
        })
    }

    async fn applied_versions(&self) -> Result<Vec<Version>, MigrationError> {
        Ok(self.state.lock().unwrap().applied.iter().copied().collect())
    }

    async fn apply(&self, migration: &Migration) -> Result<(), MigrationError> {
        let mut state = self.state.lock().unwrap();
        if state.applied.contains(&migration.version) {
            return Err(MigrationError::AlreadyApplied(migration.version));
        }
        if state.failing.contains(&migration.version) {
            return Err(MigrationError::ApplyFailed {
                version: migration.version,
                name: migration.name.clone(),
                message: "syntax error".into(),
            });
        }
        state.executed.push(migration.up.clone());
        state.applied.insert(migration.version);
        Ok(())
    }

    async fn revert(&self, migration: &Migration) -> Result<(), MigrationError> {
        let mut state = self.state.lock().unwrap();
        if state.failing.contains(&migration.version) {
            return Err(MigrationError::RevertFailed {
                version: migration.version,
                name: migration.name.clone(),
                message: "syntax error".into(),
            });
        }
        if let Some(down) = &migration.down {
            state.executed.push(down.clone());
        }
        state.applied.remove(&migration.version);
        Ok(())
    }
}
