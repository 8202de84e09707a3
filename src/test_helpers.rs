//! In-memory stand-in for a `PostgreSQL` schema.
//!
//! [`InMemoryCatalog`] implements [`StructuralContext`] and [`StateStore`] so migrations and
//! the runner can be exercised without a server. It follows the catalog rules migrations
//! depend on:
//!
//! - tables, indexes and constraint-backed indexes share one relation namespace
//! - an index on a missing table, or on a missing column, is refused
//! - dropping a missing object is refused (no `IF EXISTS` semantics)
//! - dropping a table drops its indexes
//! - `begin`/`rollback` restore the structure and the state table, like transactional DDL
//!
//! Schema qualification is ignored: the catalog models a single schema.

use crate::migration::error::{ConflictKind, StatementError};
use crate::migration::render::DdlStatement;
use crate::migration::snapshot::{SchemaSnapshot, TableShape};
use crate::migration::state_table::{StateStore, StateTable};
use crate::migration::{MigrationError, MigrationRecord, SchemaOp, StructuralContext};
use crate::schema::{IndexSpec, TableDescriptor};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
struct Catalog {
    tables: BTreeMap<String, TableDescriptor>,
    indexes: BTreeMap<String, IndexSpec>,
    records: Vec<MigrationRecord>,
}

impl Catalog {
    fn relation_exists(&self, name: &str) -> bool {
        self.tables.contains_key(name)
            || self.indexes.contains_key(name)
            || self
                .tables
                .values()
                .any(|t| t.constraint_names().contains(&name))
    }

    fn apply(&mut self, op: &SchemaOp) -> Result<(), StatementError> {
        match op {
            SchemaOp::CreateTable(table) => {
                let names = std::iter::once(table.name()).chain(table.constraint_names());
                for name in names {
                    if self.relation_exists(name) {
                        return Err(duplicate(name));
                    }
                }
                self.tables.insert(table.name().to_string(), table.clone());
            }
            SchemaOp::DropTable(table) => {
                if self.tables.remove(table.name()).is_none() {
                    return Err(StatementError::new(
                        ConflictKind::MissingObject,
                        format!("table \"{}\" does not exist", table.name()),
                    ));
                }
                self.indexes.retain(|_, index| index.table != table.name());
            }
            SchemaOp::CreateIndex(index) => {
                let Some(table) = self.tables.get(&index.table) else {
                    return Err(StatementError::new(
                        ConflictKind::MissingObject,
                        format!("relation \"{}\" does not exist", index.table),
                    ));
                };
                if let Some(column) = index.columns.iter().find(|c| table.column(c).is_none()) {
                    return Err(StatementError::new(
                        ConflictKind::Other,
                        format!("column \"{column}\" does not exist"),
                    ));
                }
                if self.relation_exists(&index.name) {
                    return Err(duplicate(&index.name));
                }
                self.indexes.insert(index.name.clone(), index.clone());
            }
            SchemaOp::DropIndex(index) => {
                if self.indexes.remove(&index.name).is_none() {
                    return Err(StatementError::new(
                        ConflictKind::MissingObject,
                        format!("index \"{}\" does not exist", index.name),
                    ));
                }
            }
        }
        Ok(())
    }
}

fn duplicate(name: &str) -> StatementError {
    StatementError::new(
        ConflictKind::DuplicateObject,
        format!("relation \"{name}\" already exists"),
    )
}

/// Single-threaded in-memory schema with a migration state table
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    catalog: RefCell<Catalog>,
    saved: RefCell<Option<Catalog>>,
    locked: Cell<bool>,
    log: RefCell<Vec<String>>,
    attempts: Cell<usize>,
    fail_at: Cell<Option<usize>>,
    rollbacks: Cell<usize>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse the `n`th structural statement (zero-based, counting every attempt)
    pub fn fail_on_statement(&self, n: usize) {
        self.fail_at.set(Some(n));
    }

    /// Successfully applied operations, in order, as `create table stock1d` etc.
    pub fn applied_ops(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    /// Table names, sorted
    pub fn tables(&self) -> Vec<String> {
        self.catalog.borrow().tables.keys().cloned().collect()
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.catalog.borrow().tables.contains_key(name)
    }

    /// Names of the secondary indexes on `table`, sorted
    pub fn indexes_on(&self, table: &str) -> Vec<String> {
        self.catalog
            .borrow()
            .indexes
            .values()
            .filter(|i| i.table == table)
            .map(|i| i.name.clone())
            .collect()
    }

    /// No tables and no indexes; the state table is not counted
    pub fn is_empty(&self) -> bool {
        let catalog = self.catalog.borrow();
        catalog.tables.is_empty() && catalog.indexes.is_empty()
    }

    pub fn records(&self) -> Vec<MigrationRecord> {
        self.catalog.borrow().records.clone()
    }

    /// Number of rollbacks performed
    pub fn rollbacks(&self) -> usize {
        self.rollbacks.get()
    }

    /// Overwrite a stored checksum, as if the migration had been edited after applying
    pub fn tamper_checksum(&self, version: i64, checksum: &str) {
        if let Some(record) = self
            .catalog
            .borrow_mut()
            .records
            .iter_mut()
            .find(|r| r.version == version)
        {
            record.checksum = checksum.to_string();
        }
    }

    /// Same shape [`SchemaSnapshot::capture`] reads from `PostgreSQL`
    pub fn snapshot(&self) -> SchemaSnapshot {
        let catalog = self.catalog.borrow();
        let mut snapshot = SchemaSnapshot::default();

        for table in catalog.tables.values() {
            let partition = table.partition();
            let shape: &mut TableShape = snapshot.table_mut(table.name());
            shape.partition_key = Some(format!("{} ({})", partition.method(), partition.column()));
            shape
                .constraints
                .insert((table.primary_key().name.clone(), "p".to_string()));
            for unique in table.unique_constraints() {
                shape.constraints.insert((unique.name.clone(), "u".to_string()));
            }
        }
        for index in catalog.indexes.values() {
            snapshot.table_mut(index.table.as_str()).indexes.insert(index.name.clone());
        }
        snapshot
    }
}

impl StructuralContext for InMemoryCatalog {
    fn apply(&self, statement: &DdlStatement) -> Result<(), StatementError> {
        let attempt = self.attempts.get();
        self.attempts.set(attempt + 1);

        if self.fail_at.get() == Some(attempt) {
            return Err(StatementError::new(
                ConflictKind::Other,
                format!("injected failure at statement {attempt}"),
            ));
        }

        self.catalog.borrow_mut().apply(&statement.op)?;
        self.log.borrow_mut().push(statement.op.to_string());
        Ok(())
    }
}

impl StateStore for InMemoryCatalog {
    fn ensure_state_table(&self, _table: &StateTable) -> Result<(), MigrationError> {
        Ok(())
    }

    fn applied_migrations(&self, _table: &StateTable) -> Result<Vec<MigrationRecord>, MigrationError> {
        let mut records = self.records();
        records.sort_by_key(|r| r.version);
        Ok(records)
    }

    fn record_migration(&self, _table: &StateTable, record: &MigrationRecord) -> Result<(), MigrationError> {
        self.catalog.borrow_mut().records.push(record.clone());
        Ok(())
    }

    fn remove_migration(&self, _table: &StateTable, version: i64) -> Result<(), MigrationError> {
        self.catalog.borrow_mut().records.retain(|r| r.version != version);
        Ok(())
    }

    fn try_lock(&self, _table: &StateTable) -> Result<bool, MigrationError> {
        Ok(!self.locked.replace(true))
    }

    fn release_lock(&self, _table: &StateTable) -> Result<(), MigrationError> {
        self.locked.set(false);
        Ok(())
    }

    fn is_locked(&self, _table: &StateTable) -> Result<bool, MigrationError> {
        Ok(self.locked.get())
    }

    fn begin(&self) -> Result<(), MigrationError> {
        let snapshot = self.catalog.borrow().clone();
        *self.saved.borrow_mut() = Some(snapshot);
        Ok(())
    }

    fn commit(&self) -> Result<(), MigrationError> {
        self.saved.borrow_mut().take();
        Ok(())
    }

    fn rollback(&self) -> Result<(), MigrationError> {
        if let Some(saved) = self.saved.borrow_mut().take() {
            *self.catalog.borrow_mut() = saved;
        }
        self.rollbacks.set(self.rollbacks.get() + 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::{Migration, SchemaManager};
    use crate::migrations::InitStockData;
    use crate::schema::{bar_table, Cadence, IndexPlan};

    #[test]
    fn test_constraint_names_share_the_namespace() {
        let catalog = InMemoryCatalog::new();
        let manager = SchemaManager::new(&catalog);
        let table = bar_table(Cadence::Day).unwrap();
        manager.create_table(&table).unwrap();

        let clash = IndexSpec {
            name: "stock1d_unique".to_string(),
            table: "stock1d".to_string(),
            columns: vec!["ticker".to_string()],
        };
        let err = manager.create_index(&clash).unwrap_err();
        assert_eq!(err.conflict_kind(), Some(ConflictKind::DuplicateObject));
    }

    #[test]
    fn test_drop_table_drops_its_indexes() {
        let catalog = InMemoryCatalog::new();
        let manager = SchemaManager::new(&catalog);
        let table = bar_table(Cadence::Hour).unwrap();
        let plan = IndexPlan::for_bar_table(&table).unwrap();
        manager.run(&SchemaOp::create_with_indexes(&table, &plan)).unwrap();

        manager.drop_table(&table).unwrap();
        assert!(catalog.is_empty());

        let err = manager.drop_index(&plan.indexes()[0]).unwrap_err();
        assert_eq!(err.conflict_kind(), Some(ConflictKind::MissingObject));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let catalog = InMemoryCatalog::new();
        let manager = SchemaManager::new(&catalog);
        let before = catalog.snapshot();

        InitStockData.up(&manager).unwrap();
        let during = catalog.snapshot();
        assert_eq!(during.tables.len(), 3);
        for name in ["stock1d", "stock1h", "stock1m"] {
            let shape = during.table(name).unwrap();
            assert_eq!(shape.partition_key.as_deref(), Some("RANGE (datetime)"));
            assert_eq!(shape.constraints.len(), 2);
            assert_eq!(shape.indexes.len(), 2);
        }

        InitStockData.down(&manager).unwrap();
        assert_eq!(catalog.snapshot(), before);
        assert!(before.diff(&catalog.snapshot()).is_empty());
    }

    #[test]
    fn test_rollback_restores_structure_but_not_lock() {
        let catalog = InMemoryCatalog::new();
        let table = StateTable::default();
        let manager = SchemaManager::new(&catalog);

        assert!(catalog.try_lock(&table).unwrap());
        catalog.begin().unwrap();
        manager.create_table(&bar_table(Cadence::Minute).unwrap()).unwrap();
        catalog.rollback().unwrap();

        assert!(catalog.is_empty());
        assert!(catalog.is_locked(&table).unwrap());
        assert!(!catalog.try_lock(&table).unwrap());
    }
}
