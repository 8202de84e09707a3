//! Structural operations: the vocabulary a migration's actions are written in.
//!
//! Every operation has an exact inverse, so a backward action can be checked
//! mechanically against its forward action instead of by reading SQL.

use crate::migration::MigrationError;
use crate::schema::{IndexPlan, IndexSpec, TableDescriptor};
use std::fmt;

/// One DDL step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaOp {
    /// Create a table with its columns, keys and partitioning clause
    CreateTable(TableDescriptor),
    /// Drop a table; carries the full descriptor so the inverse can recreate it
    DropTable(TableDescriptor),
    CreateIndex(IndexSpec),
    DropIndex(IndexSpec),
}

impl SchemaOp {
    /// The operation that undoes this one
    #[must_use]
    pub fn inverse(&self) -> SchemaOp {
        match self {
            SchemaOp::CreateTable(t) => SchemaOp::DropTable(t.clone()),
            SchemaOp::DropTable(t) => SchemaOp::CreateTable(t.clone()),
            SchemaOp::CreateIndex(i) => SchemaOp::DropIndex(i.clone()),
            SchemaOp::DropIndex(i) => SchemaOp::CreateIndex(i.clone()),
        }
    }

    /// Name of the table or index this operation touches
    pub fn object_name(&self) -> &str {
        match self {
            SchemaOp::CreateTable(t) | SchemaOp::DropTable(t) => t.name(),
            SchemaOp::CreateIndex(i) | SchemaOp::DropIndex(i) => &i.name,
        }
    }

    /// Table this operation belongs to
    pub fn table_name(&self) -> &str {
        match self {
            SchemaOp::CreateTable(t) | SchemaOp::DropTable(t) => t.name(),
            SchemaOp::CreateIndex(i) | SchemaOp::DropIndex(i) => &i.table,
        }
    }

    pub fn is_create(&self) -> bool {
        matches!(self, SchemaOp::CreateTable(_) | SchemaOp::CreateIndex(_))
    }

    /// Create `table`, then each index of `plan` in plan order
    pub fn create_with_indexes(table: &TableDescriptor, plan: &IndexPlan) -> Vec<SchemaOp> {
        std::iter::once(SchemaOp::CreateTable(table.clone()))
            .chain(plan.into_iter().cloned().map(SchemaOp::CreateIndex))
            .collect()
    }

    /// Drop each index of `plan` in reverse plan order, then drop `table`
    pub fn drop_with_indexes(table: &TableDescriptor, plan: &IndexPlan) -> Vec<SchemaOp> {
        plan.indexes()
            .iter()
            .rev()
            .cloned()
            .map(SchemaOp::DropIndex)
            .chain(std::iter::once(SchemaOp::DropTable(table.clone())))
            .collect()
    }
}

impl fmt::Display for SchemaOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaOp::CreateTable(t) => write!(f, "create table {}", t.name()),
            SchemaOp::DropTable(t) => write!(f, "drop table {}", t.name()),
            SchemaOp::CreateIndex(i) => write!(f, "create index {} on {}", i.name, i.table),
            SchemaOp::DropIndex(i) => write!(f, "drop index {} on {}", i.name, i.table),
        }
    }
}

/// The sequence that exactly undoes `ops`: inverses, last step first
pub fn invert_sequence(ops: &[SchemaOp]) -> Vec<SchemaOp> {
    ops.iter().rev().map(SchemaOp::inverse).collect()
}

/// Check that `backward` is the exact inverse of `forward`
///
/// # Errors
///
/// Returns `MigrationError::ReversalMismatch` naming the first position where
/// `backward` diverges from the inverted forward sequence (including length).
pub fn verify_reversal(
    name: &str,
    forward: &[SchemaOp],
    backward: &[SchemaOp],
) -> Result<(), MigrationError> {
    let expected = invert_sequence(forward);
    let steps = expected.len().max(backward.len());

    for position in 0..steps {
        let want = expected.get(position);
        let got = backward.get(position);
        if want != got {
            return Err(MigrationError::reversal(name, position, want, got));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{bar_table, Cadence};

    fn forward_for(cadence: Cadence) -> Vec<SchemaOp> {
        let table = bar_table(cadence).unwrap();
        let plan = IndexPlan::for_bar_table(&table).unwrap();
        SchemaOp::create_with_indexes(&table, &plan)
    }

    #[test]
    fn test_inverse_round_trips() {
        for op in forward_for(Cadence::Hour) {
            assert_eq!(op.inverse().inverse(), op);
            assert_ne!(op.inverse().is_create(), op.is_create());
        }
    }

    #[test]
    fn test_table_before_indexes() {
        let ops = forward_for(Cadence::Minute);
        let names: Vec<String> = ops.iter().map(ToString::to_string).collect();
        assert_eq!(
            names,
            [
                "create table stock1m",
                "create index idx_stock1m_ticker_datetime on stock1m",
                "create index idx_stock1m_datetime on stock1m",
            ]
        );
    }

    #[test]
    fn test_drop_with_indexes_is_inverse() {
        let table = bar_table(Cadence::Day).unwrap();
        let plan = IndexPlan::for_bar_table(&table).unwrap();
        let forward = SchemaOp::create_with_indexes(&table, &plan);
        let backward = SchemaOp::drop_with_indexes(&table, &plan);

        assert_eq!(backward, invert_sequence(&forward));
        assert_eq!(backward[0].object_name(), "idx_stock1d_datetime");
        assert_eq!(backward[1].object_name(), "idx_stock1d_ticker_datetime");
        assert_eq!(backward[2].object_name(), "stock1d");
        assert!(verify_reversal("t", &forward, &backward).is_ok());
    }

    #[test]
    fn test_verify_reversal_reports_first_divergence() {
        let forward = forward_for(Cadence::Day);
        let mut backward = invert_sequence(&forward);
        backward.swap(0, 1);

        let err = verify_reversal("InitStockData", &forward, &backward).unwrap_err();
        match err {
            MigrationError::ReversalMismatch { position, expected, found, .. } => {
                assert_eq!(position, 0);
                assert_eq!(expected, "drop index idx_stock1d_datetime on stock1d");
                assert_eq!(found, "drop index idx_stock1d_ticker_datetime on stock1d");
            }
            other => panic!("Expected ReversalMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_verify_reversal_detects_missing_step() {
        let forward = forward_for(Cadence::Day);
        let mut backward = invert_sequence(&forward);
        backward.pop();

        let err = verify_reversal("InitStockData", &forward, &backward).unwrap_err();
        assert!(matches!(
            err,
            MigrationError::ReversalMismatch { position: 2, ref found, .. } if found == "nothing"
        ));
    }
}
