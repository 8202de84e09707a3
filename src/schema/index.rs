//! Secondary index plan for bar tables.
//!
//! Two query shapes dominate: bars for one ticker over a time range, and all bars over a
//! time range. Each gets one index. Names are derived from the table and column list, so
//! applying the same plan twice collides on the name instead of silently duplicating.

use crate::schema::descriptor::columns;
use crate::schema::{validate_identifier, SchemaError, TableDescriptor};
use std::collections::HashSet;

/// Deterministic index name: `idx_{table}_{col1}_{col2}...`
pub fn index_name(table: &str, columns: &[String]) -> String {
    format!("idx_{}_{}", table, columns.join("_"))
}

/// One secondary index
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexSpec {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
}

impl IndexSpec {
    /// An index on `table` named after its columns
    pub fn new<I, S>(table: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let table = table.into();
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        Self {
            name: index_name(&table, &columns),
            table,
            columns,
        }
    }
}

/// Ordered set of indexes created after a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPlan {
    indexes: Vec<IndexSpec>,
}

impl IndexPlan {
    /// Plan from explicit column lists, in creation order
    ///
    /// # Errors
    ///
    /// Returns a `SchemaError` if a list is empty, names a column the table lacks,
    /// derives an invalid identifier, or two lists derive the same name.
    pub fn new(table: &TableDescriptor, column_lists: &[&[&str]]) -> Result<Self, SchemaError> {
        let mut names = HashSet::new();
        let mut indexes = Vec::with_capacity(column_lists.len());

        for cols in column_lists {
            let index = IndexSpec::new(table.name(), cols.iter().copied());
            if index.columns.is_empty() {
                return Err(SchemaError::EmptyColumnList {
                    table: table.name().to_string(),
                    object: index.name,
                });
            }
            validate_identifier("index", &index.name)?;
            if let Some(missing) = index.columns.iter().find(|c| table.column(c).is_none()) {
                return Err(SchemaError::UnknownColumn {
                    table: table.name().to_string(),
                    object: index.name.clone(),
                    column: missing.clone(),
                });
            }
            if !names.insert(index.name.clone()) {
                return Err(SchemaError::DuplicateName(index.name));
            }
            indexes.push(index);
        }

        Ok(Self { indexes })
    }

    /// `(ticker, <partition column>)` then `(<partition column>)`
    ///
    /// # Errors
    ///
    /// Fails if the table has no `ticker` column.
    pub fn for_bar_table(table: &TableDescriptor) -> Result<Self, SchemaError> {
        let time = table.partition().column();
        Self::new(table, &[&[columns::TICKER, time], &[time]])
    }

    pub fn indexes(&self) -> &[IndexSpec] {
        &self.indexes
    }

    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }
}

impl<'a> IntoIterator for &'a IndexPlan {
    type Item = &'a IndexSpec;
    type IntoIter = std::slice::Iter<'a, IndexSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.indexes.iter()
    }
}
