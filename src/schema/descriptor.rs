//! Table descriptors: columns, keys and the partitioning commitment of one table.

use crate::schema::{validate_identifier, Cadence, PartitionStrategy, SchemaError};
use std::collections::HashSet;

/// Column names shared by every bar table
pub mod columns {
    pub const ID: &str = "id";
    pub const DATETIME: &str = "datetime";
    pub const TICKER: &str = "ticker";
    pub const OPEN: &str = "open";
    pub const HIGH: &str = "high";
    pub const LOW: &str = "low";
    pub const CLOSE: &str = "close";
    pub const VOLUME: &str = "volume";
}

/// Longest ticker symbol a bar table accepts
pub const TICKER_MAX_LEN: u32 = 12;
/// Total digits of a bar price
pub const PRICE_PRECISION: u32 = 10;
/// Fractional digits of a bar price
pub const PRICE_SCALE: u32 = 2;

/// Storage type of a column, independent of any SQL dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    /// Auto-incrementing 32-bit integer backed by a sequence
    Serial,
    /// Timestamp without time zone
    Timestamp,
    /// Bounded character string
    VarChar(u32),
    /// Fixed-point decimal
    Decimal { precision: u32, scale: u32 },
    /// 64-bit integer
    BigInt,
}

impl ColumnKind {
    fn check(&self) -> Result<(), String> {
        match *self {
            ColumnKind::VarChar(0) => Err("string length must be positive".to_string()),
            ColumnKind::Decimal { precision, .. } if precision == 0 || precision > 1000 => {
                Err(format!("decimal precision {precision} outside 1..=1000"))
            }
            ColumnKind::Decimal { precision, scale } if scale > precision => Err(format!(
                "decimal scale {scale} exceeds precision {precision}"
            )),
            _ => Ok(()),
        }
    }
}

/// One column of a table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
    pub nullable: bool,
}

impl ColumnSpec {
    /// A `NOT NULL` column
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: false,
        }
    }

    /// Allow `NULL` in this column
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// A named key (primary key or uniqueness constraint) over an ordered column list
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeySpec {
    pub name: String,
    pub columns: Vec<String>,
}

impl KeySpec {
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether the key lists `column`
    #[must_use]
    pub fn covers(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

/// Complete structural definition of one table
///
/// Only obtainable through [`TableDescriptor::builder`], so every value has passed
/// validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableDescriptor {
    name: String,
    columns: Vec<ColumnSpec>,
    primary_key: KeySpec,
    unique: Vec<KeySpec>,
    partition: PartitionStrategy,
}

impl TableDescriptor {
    pub fn builder(name: impl Into<String>) -> TableDescriptorBuilder {
        TableDescriptorBuilder {
            name: name.into(),
            columns: Vec::new(),
            primary_key: None,
            unique: Vec::new(),
            partition: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn primary_key(&self) -> &KeySpec {
        &self.primary_key
    }

    pub fn unique_constraints(&self) -> &[KeySpec] {
        &self.unique
    }

    pub fn partition(&self) -> &PartitionStrategy {
        &self.partition
    }

    /// Names of the table-level constraints, primary key first
    pub fn constraint_names(&self) -> Vec<&str> {
        std::iter::once(self.primary_key.name.as_str())
            .chain(self.unique.iter().map(|k| k.name.as_str()))
            .collect()
    }
}

/// Builder for [`TableDescriptor`]
#[derive(Debug, Clone)]
pub struct TableDescriptorBuilder {
    name: String,
    columns: Vec<ColumnSpec>,
    primary_key: Option<KeySpec>,
    unique: Vec<KeySpec>,
    partition: Option<PartitionStrategy>,
}

impl TableDescriptorBuilder {
    #[must_use]
    pub fn column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    #[must_use]
    pub fn primary_key<I, S>(mut self, name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = Some(KeySpec::new(name, columns));
        self
    }

    #[must_use]
    pub fn unique<I, S>(mut self, name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique.push(KeySpec::new(name, columns));
        self
    }

    #[must_use]
    pub fn partition_by(mut self, strategy: PartitionStrategy) -> Self {
        self.partition = Some(strategy);
        self
    }

    /// Validate and produce the descriptor
    ///
    /// # Errors
    ///
    /// Returns a `SchemaError` when a name is not a valid identifier, a column spec is
    /// incomplete, a key or the partition clause is missing, a key references an
    /// unknown column, or the partition strategy rejects the key shape.
    pub fn build(self) -> Result<TableDescriptor, SchemaError> {
        let table = self.name;
        validate_identifier("table", &table)?;

        if self.columns.is_empty() {
            return Err(SchemaError::NoColumns { table });
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            validate_identifier("column", &column.name)?;
            if !seen.insert(column.name.as_str()) {
                return Err(SchemaError::DuplicateColumn {
                    table: table.clone(),
                    column: column.name.clone(),
                });
            }
            column
                .kind
                .check()
                .map_err(|reason| SchemaError::IncompleteColumn {
                    table: table.clone(),
                    column: column.name.clone(),
                    reason,
                })?;
            if column.kind == ColumnKind::Serial && column.nullable {
                return Err(SchemaError::IncompleteColumn {
                    table: table.clone(),
                    column: column.name.clone(),
                    reason: "serial columns cannot be nullable".to_string(),
                });
            }
        }

        let primary_key = self
            .primary_key
            .ok_or_else(|| SchemaError::MissingPrimaryKey {
                table: table.clone(),
            })?;
        if self.unique.is_empty() {
            return Err(SchemaError::MissingUniqueConstraint { table });
        }
        let partition = self
            .partition
            .ok_or_else(|| SchemaError::MissingPartitioning {
                table: table.clone(),
            })?;

        let mut names = HashSet::new();
        for key in std::iter::once(&primary_key).chain(self.unique.iter()) {
            validate_identifier("constraint", &key.name)?;
            if !names.insert(key.name.as_str()) {
                return Err(SchemaError::DuplicateName(key.name.clone()));
            }
            if key.columns.is_empty() {
                return Err(SchemaError::EmptyColumnList {
                    table: table.clone(),
                    object: key.name.clone(),
                });
            }
            if let Some(missing) = key.columns.iter().find(|c| !seen.contains(c.as_str())) {
                return Err(SchemaError::UnknownColumn {
                    table: table.clone(),
                    object: key.name.clone(),
                    column: missing.clone(),
                });
            }
        }

        partition.validate(&table, &self.columns, &primary_key, &self.unique)?;

        Ok(TableDescriptor {
            name: table,
            columns: self.columns,
            primary_key,
            unique: self.unique,
            partition,
        })
    }
}

/// Column set shared by every bar table, in storage order
pub fn bar_columns() -> Vec<ColumnSpec> {
    let price = ColumnKind::Decimal {
        precision: PRICE_PRECISION,
        scale: PRICE_SCALE,
    };
    vec![
        ColumnSpec::new(columns::ID, ColumnKind::Serial),
        ColumnSpec::new(columns::DATETIME, ColumnKind::Timestamp),
        ColumnSpec::new(columns::TICKER, ColumnKind::VarChar(TICKER_MAX_LEN)),
        ColumnSpec::new(columns::OPEN, price),
        ColumnSpec::new(columns::HIGH, price),
        ColumnSpec::new(columns::LOW, price),
        ColumnSpec::new(columns::CLOSE, price),
        ColumnSpec::new(columns::VOLUME, ColumnKind::BigInt),
    ]
}

/// Descriptor of the OHLCV bar table for `cadence`
///
/// `UNIQUE (ticker, datetime)` forbids two bars for one ticker at one instant. The
/// primary key is `(id, datetime)` rather than `id` alone because every key of a
/// range-partitioned table has to carry the partition column.
///
/// # Errors
///
/// Only fails if the shared column set were to become inconsistent.
pub fn bar_table(cadence: Cadence) -> Result<TableDescriptor, SchemaError> {
    let name = cadence.table_name();

    bar_columns()
        .into_iter()
        .fold(TableDescriptor::builder(name.as_str()), |builder, column| {
            builder.column(column)
        })
        .unique(
            format!("{name}_unique"),
            [columns::TICKER, columns::DATETIME],
        )
        .primary_key(format!("pk_{name}"), [columns::ID, columns::DATETIME])
        .partition_by(PartitionStrategy::range(columns::DATETIME))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> TableDescriptorBuilder {
        TableDescriptor::builder("ticks")
            .column(ColumnSpec::new("id", ColumnKind::Serial))
            .column(ColumnSpec::new("ts", ColumnKind::Timestamp))
            .primary_key("pk_ticks", ["id", "ts"])
            .unique("ticks_unique", ["ts"])
            .partition_by(PartitionStrategy::range("ts"))
    }

    #[test]
    fn test_bar_table_shape() {
        for cadence in Cadence::ALL {
            let table = bar_table(cadence).unwrap();
            let name = cadence.table_name();
            assert_eq!(table.name(), name);

            let names: Vec<&str> = table.columns().iter().map(|c| c.name.as_str()).collect();
            assert_eq!(
                names,
                ["id", "datetime", "ticker", "open", "high", "low", "close", "volume"]
            );
            assert!(table.columns().iter().all(|c| !c.nullable));

            assert_eq!(table.column("ticker").unwrap().kind, ColumnKind::VarChar(12));
            assert_eq!(
                table.column("close").unwrap().kind,
                ColumnKind::Decimal { precision: 10, scale: 2 }
            );
            assert_eq!(table.column("volume").unwrap().kind, ColumnKind::BigInt);

            assert_eq!(table.primary_key().columns, ["id", "datetime"]);
            assert_eq!(table.unique_constraints().len(), 1);
            assert_eq!(table.unique_constraints()[0].name, format!("{name}_unique"));
            assert_eq!(table.unique_constraints()[0].columns, ["ticker", "datetime"]);
            assert_eq!(table.partition().column(), "datetime");
            assert_eq!(table.constraint_names().len(), 2);
        }
    }

    #[test]
    fn test_minimal_builds() {
        assert!(minimal().build().is_ok());
    }

    #[test]
    fn test_missing_pieces_are_configuration_errors() {
        let err = TableDescriptor::builder("empty").build().unwrap_err();
        assert!(matches!(err, SchemaError::NoColumns { .. }));

        let err = TableDescriptor::builder("t")
            .column(ColumnSpec::new("ts", ColumnKind::Timestamp))
            .unique("t_unique", ["ts"])
            .partition_by(PartitionStrategy::range("ts"))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::MissingPrimaryKey { .. }));

        let err = TableDescriptor::builder("t")
            .column(ColumnSpec::new("ts", ColumnKind::Timestamp))
            .primary_key("pk_t", ["ts"])
            .partition_by(PartitionStrategy::range("ts"))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::MissingUniqueConstraint { .. }));

        let err = TableDescriptor::builder("t")
            .column(ColumnSpec::new("ts", ColumnKind::Timestamp))
            .primary_key("pk_t", ["ts"])
            .unique("t_unique", ["ts"])
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::MissingPartitioning { .. }));
    }

    #[test]
    fn test_incomplete_column_specs() {
        let err = minimal()
            .column(ColumnSpec::new("sym", ColumnKind::VarChar(0)))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::IncompleteColumn { ref column, .. } if column == "sym"));

        let err = minimal()
            .column(ColumnSpec::new("px", ColumnKind::Decimal { precision: 2, scale: 4 }))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::IncompleteColumn { ref column, .. } if column == "px"));

        let err = minimal()
            .column(ColumnSpec::new("seq", ColumnKind::Serial).nullable())
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::IncompleteColumn { .. }));
    }

    #[test]
    fn test_duplicate_and_unknown_columns() {
        let err = minimal()
            .column(ColumnSpec::new("ts", ColumnKind::BigInt))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateColumn { ref column, .. } if column == "ts"));

        let err = minimal()
            .unique("ticks_sym", ["sym", "ts"])
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownColumn { ref column, .. } if column == "sym"));
    }

    #[test]
    fn test_duplicate_constraint_names() {
        let err = minimal().unique("pk_ticks", ["id", "ts"]).build().unwrap_err();
        assert_eq!(err, SchemaError::DuplicateName("pk_ticks".to_string()));
    }

    #[test]
    fn test_bad_table_name() {
        let err = TableDescriptor::builder("Stock 1m")
            .column(ColumnSpec::new("ts", ColumnKind::Timestamp))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidIdentifier { kind: "table", .. }));
    }
}
