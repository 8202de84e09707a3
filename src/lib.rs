//! # stockbar
//!
//! Schema migrations for partitioned OHLCV price-bar tables on PostgreSQL, over
//! `may_postgres`.
//!
//! - [`schema`] describes the bar tables, their range partitioning and their indexes.
//! - [`migration`] turns those descriptions into ordered structural operations with exact
//!   inverses, renders them through `sea-query`, and runs them with a lock and a state table.
//! - [`migrations`] holds the migrations shipped with the crate.

pub mod config;
pub mod connection;
pub mod executor;
pub mod metrics;
pub mod migration;
pub mod migrations;
pub mod schema;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use config::MigrationConfig;
pub use connection::{connect, validate_connection_string, ConnectionError};
pub use executor::{DbError, MayPostgresExecutor, SqlExecutor};
pub use migration::{Migration, MigrationError, Migrator};
