//! Structural snapshot of a schema, for proving that revert undoes apply.

use crate::executor::{DbError, SqlExecutor};
use crate::migration::state_table::STATE_TABLE;
use std::collections::{BTreeMap, BTreeSet};

/// What one table looks like structurally
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableShape {
    /// Partition key as `PostgreSQL` prints it, e.g. `RANGE (datetime)`
    pub partition_key: Option<String>,
    /// Named primary key and unique constraints, as `(name, kind)` with kind `p` or `u`
    pub constraints: BTreeSet<(String, String)>,
    /// Secondary indexes; indexes backing a constraint are listed under `constraints`
    pub indexes: BTreeSet<String>,
}

/// Sorted description of every table in a schema
///
/// Partitions attached to a parent and the runner's own state table are left out, so two
/// snapshots taken before apply and after revert compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaSnapshot {
    pub tables: BTreeMap<String, TableShape>,
}

const TABLES_SQL: &str = "
    SELECT c.relname::text, pg_get_partkeydef(c.oid)
    FROM pg_class c
    JOIN pg_namespace n ON n.oid = c.relnamespace
    WHERE n.nspname = $1 AND c.relkind IN ('r', 'p') AND NOT c.relispartition";

const CONSTRAINTS_SQL: &str = "
    SELECT t.relname::text, con.conname::text, con.contype::text
    FROM pg_constraint con
    JOIN pg_class t ON t.oid = con.conrelid
    JOIN pg_namespace n ON n.oid = t.relnamespace
    WHERE n.nspname = $1 AND con.contype IN ('p', 'u') AND NOT t.relispartition";

const INDEXES_SQL: &str = "
    SELECT t.relname::text, i.relname::text
    FROM pg_index x
    JOIN pg_class i ON i.oid = x.indexrelid
    JOIN pg_class t ON t.oid = x.indrelid
    JOIN pg_namespace n ON n.oid = t.relnamespace
    WHERE n.nspname = $1 AND NOT t.relispartition
      AND NOT EXISTS (SELECT 1 FROM pg_constraint con WHERE con.conindid = x.indexrelid)";

impl SchemaSnapshot {
    /// Read the catalog for `schema`
    ///
    /// # Errors
    ///
    /// Returns `DbError` if a catalog query fails.
    pub fn capture(executor: &dyn SqlExecutor, schema: &str) -> Result<Self, DbError> {
        let mut snapshot = SchemaSnapshot::default();

        for row in executor.query_all(TABLES_SQL, &[&schema])? {
            let name: String = row.try_get(0)?;
            let partition_key: Option<String> = row.try_get(1)?;
            snapshot.table_mut(name).partition_key = partition_key;
        }

        for row in executor.query_all(CONSTRAINTS_SQL, &[&schema])? {
            let table: String = row.try_get(0)?;
            let name: String = row.try_get(1)?;
            let kind: String = row.try_get(2)?;
            snapshot.table_mut(table).constraints.insert((name, kind));
        }

        for row in executor.query_all(INDEXES_SQL, &[&schema])? {
            let table: String = row.try_get(0)?;
            let name: String = row.try_get(1)?;
            snapshot.table_mut(table).indexes.insert(name);
        }

        snapshot.tables.remove(STATE_TABLE);
        Ok(snapshot)
    }

    /// Entry for `table`, created empty if absent
    pub fn table_mut(&mut self, table: impl Into<String>) -> &mut TableShape {
        self.tables.entry(table.into()).or_default()
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn table(&self, table: &str) -> Option<&TableShape> {
        self.tables.get(table)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Every index name in the schema
    pub fn index_names(&self) -> BTreeSet<&str> {
        self.tables
            .values()
            .flat_map(|t| t.indexes.iter().map(String::as_str))
            .collect()
    }

    /// Human-readable differences from `other`, one line per table; empty when equal
    pub fn diff(&self, other: &SchemaSnapshot) -> Vec<String> {
        let names: BTreeSet<&String> = self.tables.keys().chain(other.tables.keys()).collect();
        names
            .into_iter()
            .filter_map(|name| match (self.tables.get(name), other.tables.get(name)) {
                (Some(_), None) => Some(format!("- table {name}")),
                (None, Some(_)) => Some(format!("+ table {name}")),
                (Some(a), Some(b)) if a != b => Some(format!("~ table {name}: {a:?} -> {b:?}")),
                _ => None,
            })
            .collect()
    }
}
