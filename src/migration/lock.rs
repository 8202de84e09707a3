//! Flyway-style migration table-based locking mechanism

use crate::migration::state_table::{StateStore, StateTable};
use crate::migration::MigrationError;
use std::time::{Duration, Instant};

/// Reserved version number for lock record
///
/// Real migrations use positive timestamps, so the lock row never collides with one.
pub const LOCK_VERSION: i64 = -1;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Lock guard that releases the lock when dropped
///
/// The lock is the state table row with `version = -1`; whoever inserts it holds the lock.
pub struct MigrationLockGuard<'a> {
    store: &'a dyn StateStore,
    table: &'a StateTable,
}

impl<'a> MigrationLockGuard<'a> {
    /// Acquire the migration lock, polling until `timeout` elapses
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::LockTimeout` if the lock cannot be acquired in time, or
    /// `MigrationError::Database` if the lock insert itself fails.
    pub fn acquire(
        store: &'a dyn StateStore,
        table: &'a StateTable,
        timeout: Duration,
    ) -> Result<Self, MigrationError> {
        acquire_migration_lock(store, table, timeout)?;
        Ok(Self { store, table })
    }
}

impl Drop for MigrationLockGuard<'_> {
    fn drop(&mut self) {
        // Errors cannot propagate out of drop
        if let Err(e) = self.store.release_lock(self.table) {
            log::warn!("Failed to release migration lock: {e}");
        }
    }
}

/// Poll for the lock row until it is ours or `timeout` elapses
///
/// # Errors
///
/// See [`MigrationLockGuard::acquire`].
pub fn acquire_migration_lock(
    store: &dyn StateStore,
    table: &StateTable,
    timeout: Duration,
) -> Result<(), MigrationError> {
    let start = Instant::now();

    loop {
        if store.try_lock(table)? {
            log::debug!("Acquired migration lock on {}", table.qualified_name());
            return Ok(());
        }

        if start.elapsed() >= timeout {
            return Err(MigrationError::LockTimeout(format!(
                "Failed to acquire migration lock within {} seconds. \
                 Manually delete the lock record if no runner is active: \
                 DELETE FROM {} WHERE version = {}",
                timeout.as_secs(),
                table.qualified_name(),
                LOCK_VERSION
            )));
        }

        log::debug!("Migration lock held by another runner; retrying");
        std::thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::InMemoryCatalog;

    #[test]
    fn test_guard_releases_on_drop() {
        let catalog = InMemoryCatalog::new();
        let table = StateTable::default();
        {
            let _guard = MigrationLockGuard::acquire(&catalog, &table, Duration::ZERO).unwrap();
            assert!(catalog.is_locked(&table).unwrap());
        }
        assert!(!catalog.is_locked(&table).unwrap());
    }

    #[test]
    fn test_held_lock_times_out() {
        let catalog = InMemoryCatalog::new();
        let table = StateTable::default();
        let _held = MigrationLockGuard::acquire(&catalog, &table, Duration::ZERO).unwrap();

        let err = MigrationLockGuard::acquire(&catalog, &table, Duration::from_millis(150))
            .err()
            .unwrap();
        assert!(matches!(err, MigrationError::LockTimeout(ref msg) if msg.contains("version = -1")));
    }
}
