//! Session-level advisory lock serializing concurrent migrate/rollback runs.

use sea_orm::{ConnectionTrait, DatabaseBackend, DbErr, Statement};
use tracing::{debug, warn};
use xxhash_rust::xxh3::xxh3_64;

use crate::tracker::TableName;

/// Derive the advisory lock key for a lock name.
#[must_use]
pub fn pg_lock_id(name: &str) -> i64 {
    i64::from_ne_bytes(xxh3_64(name.as_bytes()).to_ne_bytes())
}

/// Advisory lock keyed by the bookkeeping table, so runs against different
/// tables in one database do not block each other.
///
/// INVARIANT: the lock is held by the session that took it. Callers must run
/// acquire, every transaction, and release on a pool of exactly one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvisoryLock {
    key: i64,
}

impl AdvisoryLock {
    /// Lock for the given bookkeeping table.
    #[must_use]
    pub fn for_table(table: &TableName) -> Self {
        Self {
            key: pg_lock_id(&format!("pgmgr:{table}")),
        }
    }

    /// The numeric key passed to PostgreSQL.
    #[must_use]
    pub const fn key(self) -> i64 {
        self.key
    }

    /// Block until the lock is held by this session.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    pub async fn acquire<C: ConnectionTrait>(self, conn: &C) -> Result<(), DbErr> {
        let stmt = Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            "SELECT pg_advisory_lock($1)",
            [self.key.into()],
        );
        conn.execute(stmt).await?;
        debug!(lock_key = self.key, "Advisory lock acquired");
        Ok(())
    }

    /// Release the lock.
    ///
    /// A lock this session did not hold is logged, not reported.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    pub async fn release<C: ConnectionTrait>(self, conn: &C) -> Result<(), DbErr> {
        let stmt = Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            "SELECT pg_advisory_unlock($1) AS unlocked",
            [self.key.into()],
        );

        match conn.query_one(stmt).await? {
            Some(row) => {
                let unlocked: bool = row.try_get("", "unlocked")?;
                if unlocked {
                    debug!(lock_key = self.key, "Advisory lock released");
                } else {
                    warn!(lock_key = self.key, "Advisory lock was not held by this session");
                }
            }
            None => warn!(lock_key = self.key, "No result from advisory lock unlock query"),
        }
        Ok(())
    }
}
