//! Migration system for stockbar
//!
//! This module provides the infrastructure for schema migrations, including:
//! - Structural operations with exact inverses, rendered to DDL per engine
//! - The `Migration` trait and the per-unit forward/backward state machine
//! - Migration state tracking, locking and execution
//!
//! # Example
//!
//! ```rust
//! use stockbar::migration::{Migration, MigrationError, SchemaOp};
//! use stockbar::schema::{bar_table, Cadence, IndexPlan};
//!
//! pub struct CreateMinuteBars;
//!
//! impl Migration for CreateMinuteBars {
//!     fn name(&self) -> &str {
//!         "create_minute_bars"
//!     }
//!
//!     fn version(&self) -> i64 {
//!         20250101120000
//!     }
//!
//!     fn forward(&self) -> Result<Vec<SchemaOp>, MigrationError> {
//!         let table = bar_table(Cadence::Minute)?;
//!         let plan = IndexPlan::for_bar_table(&table)?;
//!         Ok(SchemaOp::create_with_indexes(&table, &plan))
//!     }
//! }
//!
//! // The default backward action drops both indexes, then the table
//! assert_eq!(CreateMinuteBars.backward()?.len(), 3);
//! CreateMinuteBars.verify()?;
//! # Ok::<(), MigrationError>(())
//! ```

pub mod checksum;
pub mod error;
pub mod lock;
pub mod migration;
pub mod migrator;
pub mod operation;
pub mod record;
pub mod registry;
pub mod render;
pub mod schema_manager;
pub mod snapshot;
pub mod state_table;
pub mod status;
pub mod unit;

pub use checksum::plan_checksum;
pub use error::{ConflictKind, MigrationError, StatementError};
pub use lock::MigrationLockGuard;
pub use migration::Migration;
pub use migrator::{Direction, Migrator, MigratorOptions, PlannedMigration};
pub use operation::{invert_sequence, verify_reversal, SchemaOp};
pub use record::MigrationRecord;
pub use registry::MigrationRegistry;
pub use render::{DdlRenderer, DdlStatement, PostgresRenderer};
pub use schema_manager::{SchemaManager, StructuralContext};
pub use snapshot::{SchemaSnapshot, TableShape};
pub use state_table::{StateStore, StateTable, STATE_TABLE};
pub use status::{MigrationStatus, PendingMigration};
pub use unit::{MigrationUnit, UnitState};
