//! Migration registry
//!
//! An explicit, ordered collection of migrations keyed by version. There is no
//! process-wide registry: callers build one (see `stockbar::migrations::registry`)
//! and hand it to the `Migrator`, so tests can run independent registries side by side.

use crate::migration::{Migration, MigrationError};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Ordered set of migrations, ascending by version
#[derive(Default, Clone)]
pub struct MigrationRegistry {
    migrations: BTreeMap<i64, Arc<dyn Migration>>,
}

/// Check that a version is a real `YYYYMMDDHHMMSS` timestamp
///
/// # Errors
///
/// Returns `MigrationError::InvalidVersion` otherwise.
pub fn validate_version(version: i64) -> Result<(), MigrationError> {
    if version <= 0 {
        return Err(MigrationError::InvalidVersion(version));
    }
    NaiveDateTime::parse_from_str(&version.to_string(), "%Y%m%d%H%M%S")
        .map(|_| ())
        .map_err(|_| MigrationError::InvalidVersion(version))
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a migration
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::InvalidVersion` if the version is not a timestamp, or
    /// `MigrationError::AlreadyRegistered` if the version is taken.
    pub fn register(&mut self, migration: Arc<dyn Migration>) -> Result<(), MigrationError> {
        let version = migration.version();
        validate_version(version)?;

        if self.migrations.contains_key(&version) {
            return Err(MigrationError::AlreadyRegistered {
                version,
                name: migration.name().to_string(),
            });
        }

        log::debug!("Registered migration {} ({})", migration.name(), version);
        self.migrations.insert(version, migration);
        Ok(())
    }

    /// Builder-style [`MigrationRegistry::register`]
    ///
    /// # Errors
    ///
    /// Same as [`MigrationRegistry::register`].
    pub fn with(mut self, migration: impl Migration + 'static) -> Result<Self, MigrationError> {
        self.register(Arc::new(migration))?;
        Ok(self)
    }

    /// Remove a migration; returns it if it was registered
    pub fn unregister(&mut self, version: i64) -> Option<Arc<dyn Migration>> {
        self.migrations.remove(&version)
    }

    pub fn get(&self, version: i64) -> Option<&Arc<dyn Migration>> {
        self.migrations.get(&version)
    }

    pub fn is_registered(&self, version: i64) -> bool {
        self.migrations.contains_key(&version)
    }

    /// All versions, ascending
    pub fn versions(&self) -> Vec<i64> {
        self.migrations.keys().copied().collect()
    }

    /// All migrations, ascending by version
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Arc<dyn Migration>> {
        self.migrations.values()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

impl fmt::Debug for MigrationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.migrations.iter().map(|(v, m)| (v, m.name())))
            .finish()
    }
}
