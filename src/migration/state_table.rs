//! Migration state table management
//!
//! The `stockbar_migrations` table records every applied migration and doubles as the
//! runner's lock (see [`lock`](super::lock)). [`StateStore`] is the runner's view of it,
//! together with the transaction control the runner wraps each migration in.

use crate::executor::{MayPostgresExecutor, SqlExecutor};
use crate::migration::lock::LOCK_VERSION;
use crate::migration::{MigrationError, MigrationRecord};

/// Name of the state table
pub const STATE_TABLE: &str = "stockbar_migrations";

/// Location of the state table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateTable {
    schema: Option<String>,
}

impl StateTable {
    pub fn new(schema: Option<&str>) -> Self {
        Self {
            schema: schema.map(str::to_string),
        }
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// Quoted, schema-qualified table name
    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("\"{schema}\".\"{STATE_TABLE}\""),
            None => format!("\"{STATE_TABLE}\""),
        }
    }

    /// `CREATE TABLE IF NOT EXISTS` for the state table
    pub fn create_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (
                version BIGINT PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                checksum VARCHAR(64) NOT NULL,
                applied_at TIMESTAMP NOT NULL,
                execution_time_ms BIGINT,
                success BOOLEAN NOT NULL DEFAULT true
            )",
            self.qualified_name()
        )
    }

    /// Index on `applied_at` for faster history queries
    pub fn create_index_sql(&self) -> String {
        format!(
            "CREATE INDEX IF NOT EXISTS \"idx_{STATE_TABLE}_applied_at\" ON {} (applied_at)",
            self.qualified_name()
        )
    }
}

/// Bookkeeping and transaction control used by the `Migrator`
///
/// The runner never touches the state table except through this trait, so the same
/// runner drives `PostgreSQL` and the in-memory catalog used in tests.
pub trait StateStore {
    /// Create the state table if it does not exist
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Database` if the statement fails.
    fn ensure_state_table(&self, table: &StateTable) -> Result<(), MigrationError>;

    /// Applied migrations, ascending by version, excluding the lock row
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Database` if the query fails.
    fn applied_migrations(&self, table: &StateTable) -> Result<Vec<MigrationRecord>, MigrationError>;

    /// Record a migration as applied
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Database` if the insert fails.
    fn record_migration(&self, table: &StateTable, record: &MigrationRecord) -> Result<(), MigrationError>;

    /// Remove a migration's record
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Database` if the delete fails.
    fn remove_migration(&self, table: &StateTable, version: i64) -> Result<(), MigrationError>;

    /// Insert the lock row; `Ok(false)` if another runner holds it
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Database` if the insert fails.
    fn try_lock(&self, table: &StateTable) -> Result<bool, MigrationError>;

    /// Delete the lock row
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Database` if the delete fails.
    fn release_lock(&self, table: &StateTable) -> Result<(), MigrationError>;

    /// Whether the lock row exists
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Database` if the query fails.
    fn is_locked(&self, table: &StateTable) -> Result<bool, MigrationError>;

    /// Open a transaction
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Database` if the transaction cannot be opened.
    fn begin(&self) -> Result<(), MigrationError>;

    /// Commit the open transaction
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Database` if the commit fails.
    fn commit(&self) -> Result<(), MigrationError>;

    /// Roll back the open transaction
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Database` if the rollback fails.
    fn rollback(&self) -> Result<(), MigrationError>;
}

impl StateStore for MayPostgresExecutor {
    fn ensure_state_table(&self, table: &StateTable) -> Result<(), MigrationError> {
        self.execute(&table.create_sql(), &[])?;
        self.execute(&table.create_index_sql(), &[])?;
        Ok(())
    }

    fn applied_migrations(&self, table: &StateTable) -> Result<Vec<MigrationRecord>, MigrationError> {
        let sql = format!(
            "SELECT version, name, checksum, applied_at, execution_time_ms, success
             FROM {}
             WHERE version > 0
             ORDER BY version ASC",
            table.qualified_name()
        );

        let rows = self.query_all(&sql, &[])?;
        let records = rows
            .iter()
            .map(MigrationRecord::from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn record_migration(&self, table: &StateTable, record: &MigrationRecord) -> Result<(), MigrationError> {
        let sql = format!(
            "INSERT INTO {} (version, name, checksum, applied_at, execution_time_ms, success)
             VALUES ($1, $2, $3, $4, $5, $6)",
            table.qualified_name()
        );
        let applied_at = record.applied_at.naive_utc();

        self.execute(
            &sql,
            &[
                &record.version,
                &record.name,
                &record.checksum,
                &applied_at,
                &record.execution_time_ms,
                &record.success,
            ],
        )?;
        Ok(())
    }

    fn remove_migration(&self, table: &StateTable, version: i64) -> Result<(), MigrationError> {
        let sql = format!("DELETE FROM {} WHERE version = $1", table.qualified_name());
        self.execute(&sql, &[&version])?;
        Ok(())
    }

    fn try_lock(&self, table: &StateTable) -> Result<bool, MigrationError> {
        // The primary key makes the insert atomic: exactly one runner gets a row in
        let sql = format!(
            "INSERT INTO {} (version, name, checksum, applied_at, success)
             VALUES ({LOCK_VERSION}, 'LOCK', 'lock', NOW() AT TIME ZONE 'UTC', true)
             ON CONFLICT (version) DO NOTHING",
            table.qualified_name()
        );
        Ok(self.execute(&sql, &[])? > 0)
    }

    fn release_lock(&self, table: &StateTable) -> Result<(), MigrationError> {
        let sql = format!(
            "DELETE FROM {} WHERE version = {LOCK_VERSION}",
            table.qualified_name()
        );
        self.execute(&sql, &[])?;
        Ok(())
    }

    fn is_locked(&self, table: &StateTable) -> Result<bool, MigrationError> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE version = {LOCK_VERSION}",
            table.qualified_name()
        );
        let row = self.query_one(&sql, &[])?;
        let count: i64 = row.try_get(0).map_err(crate::executor::DbError::from)?;
        Ok(count > 0)
    }

    fn begin(&self) -> Result<(), MigrationError> {
        self.execute("BEGIN", &[])?;
        Ok(())
    }

    fn commit(&self) -> Result<(), MigrationError> {
        self.execute("COMMIT", &[])?;
        Ok(())
    }

    fn rollback(&self) -> Result<(), MigrationError> {
        self.execute("ROLLBACK", &[])?;
        Ok(())
    }
}
