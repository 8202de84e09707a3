//! Migration status tracking

use crate::migration::MigrationRecord;

/// Applied and pending migrations for one schema
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// Applied migrations (from the state table), ascending by version
    pub applied: Vec<MigrationRecord>,

    /// Pending migrations (from the registry), ascending by version
    pub pending: Vec<PendingMigration>,
}

/// A registered migration that has not been applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMigration {
    pub version: i64,
    pub name: String,
    pub checksum: String,
}

impl MigrationStatus {
    #[must_use]
    pub fn new(applied: Vec<MigrationRecord>, pending: Vec<PendingMigration>) -> Self {
        Self { applied, pending }
    }

    /// Total number of migrations (applied + pending)
    #[must_use]
    pub fn total(&self) -> usize {
        self.applied.len() + self.pending.len()
    }

    /// Check if all migrations are applied
    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }

    /// Get the latest applied migration version
    #[must_use]
    pub fn latest_applied_version(&self) -> Option<i64> {
        self.applied.iter().map(|m| m.version).max()
    }

    /// Get the next pending migration version
    #[must_use]
    pub fn next_pending_version(&self) -> Option<i64> {
        self.pending.first().map(|m| m.version)
    }
}
