//! Migration-specific error types

use crate::executor::DbError;
use crate::migration::operation::SchemaOp;
use crate::migration::unit::UnitState;
use crate::schema::SchemaError;
use std::fmt;

/// Why a structural statement was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// The statement references an object that does not exist yet
    MissingObject,
    /// The statement would create an object whose name is already taken
    DuplicateObject,
    /// Any other failure reported by the execution context
    Other,
}

impl ConflictKind {
    /// Classify a `PostgreSQL` SQLSTATE
    pub fn from_sqlstate(code: Option<&str>) -> Self {
        match code {
            // duplicate_table (also raised for relations such as indexes), duplicate_object
            Some("42P07") | Some("42710") => ConflictKind::DuplicateObject,
            // undefined_table, undefined_object
            Some("42P01") | Some("42704") => ConflictKind::MissingObject,
            _ => ConflictKind::Other,
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKind::MissingObject => f.write_str("missing object"),
            ConflictKind::DuplicateObject => f.write_str("duplicate object"),
            ConflictKind::Other => f.write_str("statement failed"),
        }
    }
}

/// Failure of a single structural statement, as reported by an execution context
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct StatementError {
    pub kind: ConflictKind,
    pub message: String,
}

impl StatementError {
    pub fn new(kind: ConflictKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<DbError> for StatementError {
    fn from(error: DbError) -> Self {
        StatementError {
            kind: ConflictKind::from_sqlstate(error.sqlstate()),
            message: error.to_string(),
        }
    }
}

/// Migration-specific errors
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// Malformed or unrecognised table parameters, detected before any statement runs
    #[error("Configuration error: {0}")]
    Configuration(#[from] SchemaError),

    /// A structural statement failed; every earlier statement of the action already ran
    #[error("Statement #{index} failed ({source}): {sql}")]
    Structural {
        index: usize,
        sql: String,
        #[source]
        source: StatementError,
    },

    /// Backward action is not the exact inverse of the forward action
    #[error(
        "Migration '{name}' does not reverse cleanly at step {position}: expected {expected}, found {found}"
    )]
    ReversalMismatch {
        name: String,
        position: usize,
        expected: String,
        found: String,
    },

    /// Illegal state machine transition on a migration unit
    #[error("Migration '{name}' cannot be {action} while {state}")]
    InvalidTransition {
        name: String,
        state: UnitState,
        action: &'static str,
    },

    /// Database execution error outside of a structural statement
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// A migration's action or its bookkeeping failed while the runner executed it
    #[error("Migration '{name}' (version {version}) failed during {direction}: {source}")]
    UnitFailed {
        name: String,
        version: i64,
        direction: &'static str,
        #[source]
        source: Box<MigrationError>,
    },

    /// Two migrations share one version
    #[error("Migration '{name}' (version {version}) is already registered")]
    AlreadyRegistered { version: i64, name: String },

    /// Version is not a `YYYYMMDDHHMMSS` timestamp
    #[error("Invalid migration version: {0}")]
    InvalidVersion(i64),

    /// Migration recorded as applied but not present in the registry
    #[error("Applied migration '{name}' (version {version}) is not registered in this build")]
    MissingMigration { version: i64, name: String },

    /// Checksum mismatch
    #[error(
        "Migration '{name}' (version {version}) has been modified after being applied.\n\
         Stored checksum: {stored}\n\
         Current checksum: {current}"
    )]
    ChecksumMismatch {
        version: i64,
        name: String,
        stored: String,
        current: String,
    },

    /// Migration lock timeout
    #[error(
        "Migration lock timeout: {0}\n\
         Another process may be running migrations. If this persists, check for:\n\
         - Stuck migration process\n\
         - Database connection issues\n\
         - Manual lock row in stockbar_migrations"
    )]
    LockTimeout(String),
}

impl MigrationError {
    /// Position and text of the statement that failed, if this is a structural failure
    pub fn failed_statement(&self) -> Option<(usize, &str)> {
        match self {
            MigrationError::Structural { index, sql, .. } => Some((*index, sql.as_str())),
            MigrationError::UnitFailed { source, .. } => source.failed_statement(),
            _ => None,
        }
    }

    /// Conflict classification of a structural failure
    pub fn conflict_kind(&self) -> Option<ConflictKind> {
        match self {
            MigrationError::Structural { source, .. } => Some(source.kind),
            MigrationError::UnitFailed { source, .. } => source.conflict_kind(),
            _ => None,
        }
    }

    /// Name and version of the migration the runner was executing when this error occurred
    pub fn failed_unit(&self) -> Option<(&str, i64)> {
        match self {
            MigrationError::UnitFailed { name, version, .. } => Some((name.as_str(), *version)),
            _ => None,
        }
    }

    pub(crate) fn reversal(name: &str, position: usize, expected: Option<&SchemaOp>, found: Option<&SchemaOp>) -> Self {
        let describe = |op: Option<&SchemaOp>| op.map_or_else(|| "nothing".to_string(), ToString::to_string);
        MigrationError::ReversalMismatch {
            name: name.to_string(),
            position,
            expected: describe(expected),
            found: describe(found),
        }
    }
}
