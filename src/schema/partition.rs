//! Partitioning policy for time-indexed tables.
//!
//! Bar tables are append-mostly and read by recent time ranges, so they are declared
//! `PARTITION BY RANGE` on their timestamp column. The declaration is part of the schema;
//! the ranges themselves are attached by whoever loads data. [`PartitionBounds`] computes
//! the conventional range for a timestamp but nothing in a migration executes it.
//!
//! A partitioned parent with no partitions attached holds no rows and rejects every
//! insert until a partition covering the row's timestamp exists.

use crate::schema::descriptor::{ColumnKind, ColumnSpec, KeySpec};
use crate::schema::{validate_identifier, Cadence, SchemaError};
use chrono::{Datelike, NaiveDate, NaiveDateTime};

/// How a table is split into partitions
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PartitionStrategy {
    /// `PARTITION BY RANGE (column)`
    Range { column: String },
}

impl PartitionStrategy {
    pub fn range(column: impl Into<String>) -> Self {
        PartitionStrategy::Range {
            column: column.into(),
        }
    }

    /// Column the partition key is built from
    pub fn column(&self) -> &str {
        match self {
            PartitionStrategy::Range { column } => column,
        }
    }

    /// Partitioning method keyword
    pub fn method(&self) -> &'static str {
        match self {
            PartitionStrategy::Range { .. } => "RANGE",
        }
    }

    /// The `PARTITION BY` clause appended to `CREATE TABLE`
    pub fn clause(&self) -> String {
        format!("PARTITION BY {} (\"{}\")", self.method(), self.column())
    }

    /// Check that a table shape is legal under this strategy
    ///
    /// The partition column must exist, must be `NOT NULL`, and must appear in the
    /// primary key and in every uniqueness constraint, since `PostgreSQL` enforces
    /// uniqueness per partition only.
    ///
    /// # Errors
    ///
    /// Returns the first violated rule as a `SchemaError`.
    pub fn validate(
        &self,
        table: &str,
        columns: &[ColumnSpec],
        primary_key: &KeySpec,
        unique: &[KeySpec],
    ) -> Result<(), SchemaError> {
        let column = self.column();
        let spec = columns
            .iter()
            .find(|c| c.name == column)
            .ok_or_else(|| SchemaError::UnknownColumn {
                table: table.to_string(),
                object: self.clause(),
                column: column.to_string(),
            })?;

        if spec.nullable {
            return Err(SchemaError::NullablePartitionColumn {
                table: table.to_string(),
                column: column.to_string(),
            });
        }

        let orderable = match self {
            PartitionStrategy::Range { .. } => {
                matches!(spec.kind, ColumnKind::Timestamp | ColumnKind::BigInt)
            }
        };
        if !orderable {
            return Err(SchemaError::IncompleteColumn {
                table: table.to_string(),
                column: column.to_string(),
                reason: "range partition column must be a timestamp or integer".to_string(),
            });
        }

        for key in std::iter::once(primary_key).chain(unique.iter()) {
            if !key.covers(column) {
                return Err(SchemaError::PartitionKeyNotCovered {
                    table: table.to_string(),
                    constraint: key.name.clone(),
                    column: column.to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Width of one range partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionGranularity {
    /// One partition per calendar day
    Daily,
    /// One partition per calendar month
    Monthly,
}

impl PartitionGranularity {
    /// Minute bars are dense enough to warrant a partition per day; hour and day bars
    /// share one per month.
    pub fn for_cadence(cadence: Cadence) -> Self {
        match cadence {
            Cadence::Minute => PartitionGranularity::Daily,
            Cadence::Hour | Cadence::Day => PartitionGranularity::Monthly,
        }
    }

    fn suffix_format(self) -> &'static str {
        match self {
            PartitionGranularity::Daily => "%Y_%m_%d",
            PartitionGranularity::Monthly => "%Y_%m",
        }
    }

    fn range_of(self, ts: NaiveDateTime) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let date = ts.date();
        let (start, end) = match self {
            PartitionGranularity::Daily => (date, date.succ_opt()?),
            PartitionGranularity::Monthly => {
                let start = NaiveDate::from_ymd_opt(date.year(), date.month(), 1)?;
                let end = if date.month() == 12 {
                    NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)?
                } else {
                    NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)?
                };
                (start, end)
            }
        };
        Some((start.and_hms_opt(0, 0, 0)?, end.and_hms_opt(0, 0, 0)?))
    }
}

/// Half-open `[from, to)` range of one partition of a parent table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionBounds {
    pub parent: String,
    pub name: String,
    pub from: NaiveDateTime,
    pub to: NaiveDateTime,
}

impl PartitionBounds {
    /// The partition of `parent` that should hold a row stamped `ts`
    ///
    /// Partition names follow `{parent}_{YYYY}_{MM}[_{DD}]`.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError::OutOfRange` at the edge of chrono's calendar, or an
    /// identifier error if the derived name is not a valid identifier.
    pub fn containing(
        parent: &str,
        granularity: PartitionGranularity,
        ts: NaiveDateTime,
    ) -> Result<Self, SchemaError> {
        let (from, to) = granularity
            .range_of(ts)
            .ok_or_else(|| SchemaError::OutOfRange(ts.to_string()))?;
        let name = format!("{parent}_{}", from.format(granularity.suffix_format()));
        validate_identifier("partition", &name)?;

        Ok(Self {
            parent: parent.to_string(),
            name,
            from,
            to,
        })
    }

    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        self.from <= ts && ts < self.to
    }

    /// Statement attaching this range as a new partition of its parent
    ///
    /// With `schema`, both the partition and its parent are qualified with it.
    pub fn attach_sql(&self, schema: Option<&str>) -> String {
        const FMT: &str = "%Y-%m-%d %H:%M:%S";
        let qualify = |name: &str| match schema {
            Some(schema) => format!("\"{schema}\".\"{name}\""),
            None => format!("\"{name}\""),
        };
        format!(
            "CREATE TABLE {} PARTITION OF {} FOR VALUES FROM ('{}') TO ('{}')",
            qualify(&self.name),
            qualify(&self.parent),
            self.from.format(FMT),
            self.to.format(FMT),
        )
    }
}
