//! Declarative schema descriptions for the price-bar table family.
//!
//! Nothing in this module touches a database. A [`TableDescriptor`] states what a table
//! looks like, the [`PartitionStrategy`] states how it is split, and an [`IndexPlan`]
//! states which secondary indexes support the dominant query shapes. The migration layer
//! turns these into ordered structural operations.
//!
//! ```rust
//! use stockbar::schema::{bar_table, Cadence, IndexPlan};
//!
//! let table = bar_table(Cadence::Minute)?;
//! assert_eq!(table.name(), "stock1m");
//! assert_eq!(table.primary_key().columns, vec!["id", "datetime"]);
//!
//! let plan = IndexPlan::for_bar_table(&table)?;
//! assert_eq!(plan.indexes()[0].name, "idx_stock1m_ticker_datetime");
//! # Ok::<(), stockbar::schema::SchemaError>(())
//! ```

pub mod cadence;
pub mod descriptor;
pub mod index;
pub mod partition;

pub use cadence::Cadence;
pub use descriptor::{
    bar_columns, bar_table, ColumnKind, ColumnSpec, KeySpec, TableDescriptor,
    TableDescriptorBuilder,
};
pub use index::{index_name, IndexPlan, IndexSpec};
pub use partition::{PartitionBounds, PartitionGranularity, PartitionStrategy};

use once_cell::sync::Lazy;
use regex::Regex;

/// Longest identifier `PostgreSQL` keeps without truncation
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Configuration-time failures while describing a schema
///
/// These are raised before any statement reaches the database.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("unknown bar cadence '{0}' (expected one of 1m, 1h, 1d)")]
    UnknownCadence(String),

    #[error("invalid {kind} identifier '{name}'")]
    InvalidIdentifier { kind: &'static str, name: String },

    #[error("table '{table}' declares no columns")]
    NoColumns { table: String },

    #[error("table '{table}' declares column '{column}' more than once")]
    DuplicateColumn { table: String, column: String },

    #[error("column '{table}.{column}' is incomplete: {reason}")]
    IncompleteColumn {
        table: String,
        column: String,
        reason: String,
    },

    #[error("table '{table}' has no primary key")]
    MissingPrimaryKey { table: String },

    #[error("table '{table}' has no uniqueness constraint")]
    MissingUniqueConstraint { table: String },

    #[error("table '{table}' has no partitioning clause")]
    MissingPartitioning { table: String },

    #[error("'{object}' on table '{table}' references unknown column '{column}'")]
    UnknownColumn {
        table: String,
        object: String,
        column: String,
    },

    #[error("'{object}' on table '{table}' lists no columns")]
    EmptyColumnList { table: String, object: String },

    #[error(
        "'{constraint}' on partitioned table '{table}' must include partition column '{column}'"
    )]
    PartitionKeyNotCovered {
        table: String,
        constraint: String,
        column: String,
    },

    #[error("partition column '{table}.{column}' must be NOT NULL")]
    NullablePartitionColumn { table: String, column: String },

    #[error("object name '{0}' is used more than once")]
    DuplicateName(String),

    #[error("timestamp {0} has no partition range (out of calendar bounds)")]
    OutOfRange(String),

    #[error("identifier pattern failed to compile: {0}")]
    Pattern(String),
}

static IDENTIFIER: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_$]*$"));

/// Check a name against `PostgreSQL`'s unquoted identifier rules
///
/// Lower case only, so that quoted and unquoted spellings refer to the same object.
pub(crate) fn validate_identifier(kind: &'static str, name: &str) -> Result<(), SchemaError> {
    let re = IDENTIFIER
        .as_ref()
        .map_err(|e| SchemaError::Pattern(e.to_string()))?;

    if name.len() > MAX_IDENTIFIER_LEN || !re.is_match(name) {
        return Err(SchemaError::InvalidIdentifier {
            kind,
            name: name.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("table", "stock1m").is_ok());
        assert!(validate_identifier("index", "idx_stock1m_ticker_datetime").is_ok());

        for bad in ["", "1stock", "Stock", "stock-1m", "stock 1m"] {
            assert!(
                validate_identifier("table", bad).is_err(),
                "Should reject: {bad:?}"
            );
        }

        let long = "a".repeat(MAX_IDENTIFIER_LEN + 1);
        assert!(validate_identifier("table", &long).is_err());
    }

    #[test]
    fn test_identifier_pattern_compiled_once() {
        let first: *const Regex = IDENTIFIER.as_ref().unwrap();
        assert!(validate_identifier("column", "datetime").is_ok());
        let second: *const Regex = IDENTIFIER.as_ref().unwrap();
        assert_eq!(first, second);
    }
}
