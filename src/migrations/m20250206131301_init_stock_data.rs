//! Migration: Init Stock Data
//! Version: 20250206131301
//! Description: Creates the partitioned price-bar tables stock1d, stock1m and stock1h

use crate::migration::{Migration, MigrationError, SchemaOp};
use crate::schema::{bar_table, Cadence, IndexPlan};

/// Creation order. Reversal walks it backwards.
const CADENCES: [Cadence; 3] = [Cadence::Day, Cadence::Minute, Cadence::Hour];

pub struct InitStockData;

impl Migration for InitStockData {
    fn name(&self) -> &str {
        "InitStockData"
    }

    fn version(&self) -> i64 {
        20250206131301
    }

    fn forward(&self) -> Result<Vec<SchemaOp>, MigrationError> {
        let mut ops = Vec::new();
        for cadence in CADENCES {
            let table = bar_table(cadence)?;
            let plan = IndexPlan::for_bar_table(&table)?;
            ops.extend(SchemaOp::create_with_indexes(&table, &plan));
        }
        Ok(ops)
    }

    fn backward(&self) -> Result<Vec<SchemaOp>, MigrationError> {
        let mut ops = Vec::new();
        for cadence in CADENCES.into_iter().rev() {
            let table = bar_table(cadence)?;
            let plan = IndexPlan::for_bar_table(&table)?;
            ops.extend(SchemaOp::drop_with_indexes(&table, &plan));
        }
        Ok(ops)
    }
}
