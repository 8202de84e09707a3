//! `MigrationRecord` - Represents entries in the `stockbar_migrations` state table

use crate::executor::DbError;
use chrono::{DateTime, NaiveDateTime, Utc};

/// One applied migration, as stored in the state table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    /// Migration version (timestamp: YYYYMMDDHHMMSS)
    pub version: i64,

    /// Human-readable migration name
    pub name: String,

    /// `SHA-256` checksum of the migration's rendered forward SQL
    pub checksum: String,

    /// When the migration was applied
    pub applied_at: DateTime<Utc>,

    /// Execution time in milliseconds (`None` if not recorded)
    pub execution_time_ms: Option<i64>,

    /// Whether the migration completed successfully
    pub success: bool,
}

impl MigrationRecord {
    #[must_use]
    pub fn new(
        version: i64,
        name: String,
        checksum: String,
        applied_at: DateTime<Utc>,
        execution_time_ms: Option<i64>,
        success: bool,
    ) -> Self {
        Self {
            version,
            name,
            checksum,
            applied_at,
            execution_time_ms,
            success,
        }
    }

    /// Create a `MigrationRecord` from a database row
    ///
    /// Expected column order: `version`, `name`, `checksum`, `applied_at`, `execution_time_ms`, `success`
    ///
    /// # Errors
    ///
    /// Returns `DbError` if a column is missing or has an unexpected type.
    pub fn from_row(row: &may_postgres::Row) -> Result<Self, DbError> {
        let applied_at: NaiveDateTime = row.try_get(3)?;

        Ok(Self {
            version: row.try_get(0)?,
            name: row.try_get(1)?,
            checksum: row.try_get(2)?,
            // `TIMESTAMP` has no zone; the runner always writes UTC
            applied_at: applied_at.and_utc(),
            execution_time_ms: row.try_get(4)?,
            success: row.try_get(5)?,
        })
    }
}
