//! Migrations shipped with this crate, in version order.

mod m20250206131301_init_stock_data;

pub use m20250206131301_init_stock_data::InitStockData;

use crate::migration::{MigrationError, MigrationRegistry};

/// Registry of every migration in this crate
///
/// # Errors
///
/// Returns `MigrationError::AlreadyRegistered` if two migrations share a version.
pub fn registry() -> Result<MigrationRegistry, MigrationError> {
    MigrationRegistry::new().with(InitStockData)
}
