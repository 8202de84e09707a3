//! Migrator - Core migration execution engine

use crate::config::MigrationConfig;
use crate::migration::checksum::plan_checksum;
use crate::migration::lock::MigrationLockGuard;
use crate::migration::render::{DdlRenderer, DdlStatement, PostgresRenderer};
use crate::migration::state_table::{StateStore, StateTable};
use crate::migration::unit::MigrationUnit;
use crate::migration::{
    Migration, MigrationError, MigrationRecord, MigrationRegistry, MigrationStatus,
    PendingMigration, SchemaManager, StructuralContext,
};
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Which action of a migration to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runner settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigratorOptions {
    /// Schema to qualify every object with; `None` relies on the session's `search_path`
    pub schema: Option<String>,
    pub lock_timeout: Duration,
    /// Wrap each migration's action and its bookkeeping in one transaction
    pub transactional: bool,
}

impl Default for MigratorOptions {
    fn default() -> Self {
        Self {
            schema: None,
            lock_timeout: Duration::from_secs(60),
            transactional: true,
        }
    }
}

impl From<&MigrationConfig> for MigratorOptions {
    fn from(config: &MigrationConfig) -> Self {
        Self {
            schema: Some(config.schema.clone()),
            lock_timeout: Duration::from_secs(config.lock_timeout_seconds),
            transactional: config.transactional,
        }
    }
}

/// One migration's statements in a dry run
#[derive(Debug, Clone)]
pub struct PlannedMigration {
    pub version: i64,
    pub name: String,
    pub direction: Direction,
    pub statements: Vec<DdlStatement>,
}

/// Core migration execution engine
///
/// The `Migrator` compares a [`MigrationRegistry`] with the state table, takes the lock,
/// and runs pending migrations one after another. Nothing runs concurrently: a migration's
/// statements finish before the next migration starts.
pub struct Migrator {
    registry: MigrationRegistry,
    options: MigratorOptions,
    state_table: StateTable,
}

impl Migrator {
    pub fn new(registry: MigrationRegistry) -> Self {
        Self::with_options(registry, MigratorOptions::default())
    }

    pub fn with_options(registry: MigrationRegistry, options: MigratorOptions) -> Self {
        let state_table = StateTable::new(options.schema.as_deref());
        Self {
            registry,
            options,
            state_table,
        }
    }

    pub fn from_config(registry: MigrationRegistry, config: &MigrationConfig) -> Self {
        Self::with_options(registry, MigratorOptions::from(config))
    }

    pub fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    pub fn options(&self) -> &MigratorOptions {
        &self.options
    }

    pub fn state_table(&self) -> &StateTable {
        &self.state_table
    }

    fn manager<'a>(&self, context: &'a dyn StructuralContext) -> SchemaManager<'a> {
        match &self.options.schema {
            Some(schema) => SchemaManager::with_schema(context, schema),
            None => SchemaManager::new(context),
        }
    }

    /// Checksum of a migration's forward statements
    ///
    /// Rendered without schema qualification so moving the schema does not invalidate it.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Configuration` if the migration cannot describe its tables.
    pub fn checksum(&self, migration: &dyn Migration) -> Result<String, MigrationError> {
        let ops = migration.forward()?;
        let statements = PostgresRenderer::default().render_all(&ops);
        Ok(plan_checksum(migration.name(), &statements))
    }

    /// Check every registered migration's backward action against its forward action
    ///
    /// # Errors
    ///
    /// Returns the first `ReversalMismatch` (or configuration error) found.
    pub fn verify(&self) -> Result<(), MigrationError> {
        for migration in self.registry.iter() {
            migration.verify()?;
            log::debug!("{} reverses cleanly", migration.name());
        }
        Ok(())
    }

    /// Get migration status (applied vs pending)
    ///
    /// # Errors
    ///
    /// Returns `ChecksumMismatch` if an applied migration changed since it was applied, and
    /// `MissingMigration` if the state table records a version the registry lacks.
    pub fn status<S: StateStore + ?Sized>(&self, store: &S) -> Result<MigrationStatus, MigrationError> {
        store.ensure_state_table(&self.state_table)?;
        let applied = store.applied_migrations(&self.state_table)?;

        if let Some(record) = applied.iter().find(|r| !self.registry.is_registered(r.version)) {
            return Err(MigrationError::MissingMigration {
                version: record.version,
                name: record.name.clone(),
            });
        }

        let mut pending = Vec::new();
        for migration in self.registry.iter() {
            let checksum = self.checksum(migration.as_ref())?;
            match applied.iter().find(|r| r.version == migration.version()) {
                Some(record) if record.checksum != checksum => {
                    return Err(MigrationError::ChecksumMismatch {
                        version: record.version,
                        name: record.name.clone(),
                        stored: record.checksum.clone(),
                        current: checksum,
                    });
                }
                Some(_) => {}
                None => pending.push(PendingMigration {
                    version: migration.version(),
                    name: migration.name().to_string(),
                    checksum,
                }),
            }
        }

        Ok(MigrationStatus::new(applied, pending))
    }

    /// Apply pending migrations, oldest first
    ///
    /// `steps` limits how many are applied; `None` applies all of them.
    /// Returns the number of migrations applied.
    ///
    /// # Errors
    ///
    /// Stops at the first failing migration and returns its error. Migrations applied
    /// before it stay applied and recorded.
    pub fn up<E>(&self, target: &E, steps: Option<usize>) -> Result<usize, MigrationError>
    where
        E: StateStore + StructuralContext,
    {
        target.ensure_state_table(&self.state_table)?;
        let _lock = MigrationLockGuard::acquire(target, &self.state_table, self.options.lock_timeout)?;

        let status = self.status(target)?;
        let take = steps.unwrap_or(status.pending.len());
        let mut applied_count = 0;

        for pending in status.pending.iter().take(take) {
            let migration = self.registered(pending.version, &pending.name)?;
            let mut unit = MigrationUnit::new(migration);
            self.execute_unit(target, &mut unit, Direction::Up, &pending.checksum)?;
            applied_count += 1;
        }

        if applied_count == 0 {
            log::info!("No pending migrations");
        }
        Ok(applied_count)
    }

    /// Revert applied migrations, newest first
    ///
    /// `steps` defaults to one. Returns the number of migrations reverted.
    ///
    /// # Errors
    ///
    /// Stops at the first failing migration and returns its error.
    pub fn down<E>(&self, target: &E, steps: Option<usize>) -> Result<usize, MigrationError>
    where
        E: StateStore + StructuralContext,
    {
        target.ensure_state_table(&self.state_table)?;
        let _lock = MigrationLockGuard::acquire(target, &self.state_table, self.options.lock_timeout)?;

        let status = self.status(target)?;
        let take = steps.unwrap_or(1);
        let mut reverted_count = 0;

        for record in status.applied.iter().rev().take(take) {
            let migration = self.registered(record.version, &record.name)?;
            let mut unit = MigrationUnit::applied(migration);
            self.execute_unit(target, &mut unit, Direction::Down, &record.checksum)?;
            reverted_count += 1;
        }

        Ok(reverted_count)
    }

    /// Statements `up` or `down` would run with the same `steps`, without running them
    ///
    /// # Errors
    ///
    /// Same as [`Migrator::status`].
    pub fn plan<S: StateStore + ?Sized>(
        &self,
        store: &S,
        direction: Direction,
        steps: Option<usize>,
    ) -> Result<Vec<PlannedMigration>, MigrationError> {
        let status = self.status(store)?;
        let targets: Vec<(i64, String)> = match direction {
            Direction::Up => status
                .pending
                .iter()
                .take(steps.unwrap_or(status.pending.len()))
                .map(|p| (p.version, p.name.clone()))
                .collect(),
            Direction::Down => status
                .applied
                .iter()
                .rev()
                .take(steps.unwrap_or(1))
                .map(|r| (r.version, r.name.clone()))
                .collect(),
        };

        targets
            .into_iter()
            .map(|(version, name)| {
                let migration = self.registered(version, &name)?;
                self.render(migration.as_ref(), direction)
            })
            .collect()
    }

    /// Every registered migration's statements in `direction`, without a database
    ///
    /// Up lists migrations oldest first, down newest first.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Configuration` if a migration cannot describe its tables.
    pub fn render_all(&self, direction: Direction) -> Result<Vec<PlannedMigration>, MigrationError> {
        let migrations: Vec<&Arc<dyn Migration>> = match direction {
            Direction::Up => self.registry.iter().collect(),
            Direction::Down => self.registry.iter().rev().collect(),
        };
        migrations
            .into_iter()
            .map(|m| self.render(m.as_ref(), direction))
            .collect()
    }

    fn render(&self, migration: &dyn Migration, direction: Direction) -> Result<PlannedMigration, MigrationError> {
        let ops = match direction {
            Direction::Up => migration.forward()?,
            Direction::Down => migration.backward()?,
        };
        let renderer = match &self.options.schema {
            Some(schema) => PostgresRenderer::with_schema(schema.as_str()),
            None => PostgresRenderer::default(),
        };
        Ok(PlannedMigration {
            version: migration.version(),
            name: migration.name().to_string(),
            direction,
            statements: renderer.render_all(&ops),
        })
    }

    fn registered(&self, version: i64, name: &str) -> Result<Arc<dyn Migration>, MigrationError> {
        self.registry
            .get(version)
            .cloned()
            .ok_or_else(|| MigrationError::MissingMigration {
                version,
                name: name.to_string(),
            })
    }

    /// Run one unit's action and its bookkeeping, inside a transaction when configured
    fn execute_unit<E>(
        &self,
        target: &E,
        unit: &mut MigrationUnit,
        direction: Direction,
        checksum: &str,
    ) -> Result<(), MigrationError>
    where
        E: StateStore + StructuralContext,
    {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::migration_span(unit.name(), unit.version(), direction.as_str()).entered();

        let start = Instant::now();
        let manager = self.manager(target);
        let transactional = self.options.transactional;

        if transactional {
            target.begin()?;
        }

        let result = match direction {
            Direction::Up => unit.apply(&manager).and_then(|_| {
                let execution_time = i64::try_from(start.elapsed().as_millis()).unwrap_or(i64::MAX);
                let record = MigrationRecord::new(
                    unit.version(),
                    unit.name().to_string(),
                    checksum.to_string(),
                    Utc::now(),
                    Some(execution_time),
                    true,
                );
                target.record_migration(&self.state_table, &record)
            }),
            Direction::Down => unit
                .revert(&manager)
                .and_then(|_| target.remove_migration(&self.state_table, unit.version())),
        };

        match result {
            Ok(()) => {
                if transactional {
                    target.commit()?;
                }
                log::info!(
                    "Migrated {} {} ({}) in {:?}",
                    direction,
                    unit.name(),
                    unit.version(),
                    start.elapsed()
                );
                #[cfg(feature = "metrics")]
                METRICS.record_migration(direction.as_str());
                Ok(())
            }
            Err(e) => {
                log::error!("Migration {} {} failed: {}", direction, unit.name(), e);
                if transactional {
                    if let Err(rollback) = target.rollback() {
                        log::error!("Rollback after failed migration also failed: {rollback}");
                    }
                }
                Err(MigrationError::UnitFailed {
                    name: unit.name().to_string(),
                    version: unit.version(),
                    direction: direction.as_str(),
                    source: Box::new(e),
                })
            }
        }
    }
}
