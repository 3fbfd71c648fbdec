//! Bookkeeping table access.
//!
//! The table holds one row per applied migration:
//!
//! ```sql
//! version    BIGINT      PRIMARY KEY
//! applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
//! ```
//!
//! Every method is generic over [`ConnectionTrait`] so the same code runs on
//! the pool and inside a transaction.

use std::fmt;

use pgmgr_core::migration::{MigrationError, SchemaVersion};
use pgmgr_shared::Version;
use sea_orm::{ConnectionTrait, DatabaseBackend, DbErr, Statement};

const MAX_IDENTIFIER_LEN: usize = 63;

/// A validated, optionally schema-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName {
    schema: Option<String>,
    table: String,
}

impl TableName {
    /// Validate `raw` as `table` or `schema.table`.
    ///
    /// Each part must start with a letter or `_`, continue with letters, digits,
    /// `_` or `$`, and fit PostgreSQL's 63-byte identifier limit.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::InvalidTable`] if any part is invalid.
    pub fn parse(raw: &str) -> Result<Self, MigrationError> {
        let invalid = || MigrationError::InvalidTable(raw.to_string());

        let mut parts = raw.split('.');
        let first = parts.next().ok_or_else(invalid)?;
        let second = parts.next();
        if parts.next().is_some() {
            return Err(invalid());
        }

        let (schema, table) = match second {
            Some(table) => (Some(first), table),
            None => (None, first),
        };
        for part in schema.iter().chain(std::iter::once(&table)) {
            if !is_identifier(part) {
                return Err(invalid());
            }
        }

        Ok(Self {
            schema: schema.map(String::from),
            table: table.to_string(),
        })
    }

    /// Double-quoted form safe to splice into SQL.
    #[must_use]
    pub fn quoted(&self) -> String {
        match &self.schema {
            Some(schema) => format!("\"{schema}\".\"{}\"", self.table),
            None => format!("\"{}\"", self.table),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{schema}.{}", self.table),
            None => f.write_str(&self.table),
        }
    }
}

fn is_identifier(part: &str) -> bool {
    let mut chars = part.chars();
    let Some(head) = chars.next() else {
        return false;
    };
    part.len() <= MAX_IDENTIFIER_LEN
        && (head.is_ascii_alphabetic() || head == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Reads and writes the bookkeeping table.
#[derive(Debug, Clone)]
pub struct VersionTracker {
    table: TableName,
}

impl VersionTracker {
    /// Create a tracker for `table`.
    #[must_use]
    pub fn new(table: TableName) -> Self {
        Self { table }
    }

    /// The tracked table.
    #[must_use]
    pub fn table(&self) -> &TableName {
        &self.table
    }

    /// Check whether the table exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn table_exists<C: ConnectionTrait>(&self, conn: &C) -> Result<bool, DbErr> {
        let stmt = Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            "SELECT to_regclass($1) IS NOT NULL AS present",
            [self.table.quoted().into()],
        );
        match conn.query_one(stmt).await? {
            Some(row) => row.try_get("", "present"),
            None => Ok(false),
        }
    }

    /// Read the schema state.
    ///
    /// A missing table is [`SchemaVersion::Missing`], not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub async fn current_version<C: ConnectionTrait>(&self, conn: &C) -> Result<SchemaVersion, DbErr> {
        if !self.table_exists(conn).await? {
            return Ok(SchemaVersion::Missing);
        }

        let stmt = Statement::from_string(DatabaseBackend::Postgres, self.latest_sql());
        let latest: Option<i64> = match conn.query_one(stmt).await? {
            Some(row) => row.try_get("", "version")?,
            None => None,
        };

        Ok(latest.map_or(SchemaVersion::Empty, |v| SchemaVersion::At(Version(v))))
    }

    /// Create the table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    pub async fn ensure_table<C: ConnectionTrait>(&self, conn: &C) -> Result<(), DbErr> {
        conn.execute_unprepared(&self.create_table_sql()).await?;
        Ok(())
    }

    /// List applied versions, ascending. Empty when the table is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub async fn applied_versions<C: ConnectionTrait>(&self, conn: &C) -> Result<Vec<Version>, DbErr> {
        if !self.table_exists(conn).await? {
            return Ok(Vec::new());
        }

        let stmt = Statement::from_string(DatabaseBackend::Postgres, self.applied_sql());
        conn.query_all(stmt)
            .await?
            .iter()
            .map(|row| row.try_get::<i64>("", "version").map(Version))
            .collect()
    }

    /// Check whether `version` is recorded.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn is_applied<C: ConnectionTrait>(&self, conn: &C, version: Version) -> Result<bool, DbErr> {
        let stmt = Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            self.is_applied_sql(),
            [version.as_i64().into()],
        );
        match conn.query_one(stmt).await? {
            Some(row) => row.try_get("", "applied"),
            None => Ok(false),
        }
    }

    /// Record `version` as applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails (including a duplicate version).
    pub async fn record_applied<C: ConnectionTrait>(&self, conn: &C, version: Version) -> Result<(), DbErr> {
        let stmt = Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            self.insert_sql(),
            [version.as_i64().into()],
        );
        conn.execute(stmt).await?;
        Ok(())
    }

    /// Remove `version` from the table.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn record_rolled_back<C: ConnectionTrait>(&self, conn: &C, version: Version) -> Result<(), DbErr> {
        let stmt = Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            self.delete_sql(),
            [version.as_i64().into()],
        );
        conn.execute(stmt).await?;
        Ok(())
    }

    fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (version BIGINT PRIMARY KEY, applied_at TIMESTAMPTZ NOT NULL DEFAULT now())",
            self.table.quoted()
        )
    }

    fn latest_sql(&self) -> String {
        format!("SELECT MAX(version) AS version FROM {}", self.table.quoted())
    }

    fn applied_sql(&self) -> String {
        format!("SELECT version FROM {} ORDER BY version", self.table.quoted())
    }

    fn is_applied_sql(&self) -> String {
        format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE version = $1) AS applied",
            self.table.quoted()
        )
    }

    fn insert_sql(&self) -> String {
        format!("INSERT INTO {} (version) VALUES ($1)", self.table.quoted())
    }

    fn delete_sql(&self) -> String {
        format!("DELETE FROM {} WHERE version = $1", self.table.quoted())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("schema_migrations", "\"schema_migrations\"")]
    #[case("ops.schema_migrations", "\"ops\".\"schema_migrations\"")]
    #[case("_private$1", "\"_private$1\"")]
    fn test_valid_table_names(#[case] raw: &str, #[case] quoted: &str) {
        let table = TableName::parse(raw).unwrap();
        assert_eq!(table.quoted(), quoted);
        assert_eq!(table.to_string(), raw);
    }

    #[rstest]
    #[case("")]
    #[case("1table")]
    #[case("a.b.c")]
    #[case("bad-name")]
    #[case("x; DROP TABLE users")]
    #[case("\"quoted\"")]
    #[case(".table")]
    fn test_invalid_table_names(#[case] raw: &str) {
        assert!(matches!(
            TableName::parse(raw),
            Err(MigrationError::InvalidTable(_))
        ));
    }

    #[test]
    fn test_identifier_length_limit() {
        assert!(TableName::parse(&"a".repeat(63)).is_ok());
        assert!(TableName::parse(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_generated_sql() {
        let tracker = VersionTracker::new(TableName::parse("public.schema_migrations").unwrap());

        assert_eq!(
            tracker.create_table_sql(),
            "CREATE TABLE IF NOT EXISTS \"public\".\"schema_migrations\" (version BIGINT PRIMARY KEY, applied_at TIMESTAMPTZ NOT NULL DEFAULT now())"
        );
        assert_eq!(
            tracker.insert_sql(),
            "INSERT INTO \"public\".\"schema_migrations\" (version) VALUES ($1)"
        );
        assert_eq!(
            tracker.delete_sql(),
            "DELETE FROM \"public\".\"schema_migrations\" WHERE version = $1"
        );
        assert_eq!(
            tracker.latest_sql(),
            "SELECT MAX(version) AS version FROM \"public\".\"schema_migrations\""
        );
    }
}
