//! Forward/backward state machine around a single migration

use super::migration::Migration;
use super::schema_manager::SchemaManager;
use super::MigrationError;
use std::fmt;
use std::sync::Arc;

/// Lifecycle of a migration unit
///
/// ```text
/// Unapplied -> Applying -> Applied -> Reverting -> Unapplied
///                  \                      /
///                   +------> Failed <----+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Unapplied,
    Applying,
    Applied,
    Reverting,
    /// A statement failed part way through an action; the schema may hold partial effects
    Failed,
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnitState::Unapplied => "unapplied",
            UnitState::Applying => "applying",
            UnitState::Applied => "applied",
            UnitState::Reverting => "reverting",
            UnitState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One migration plus where it stands against a particular schema
pub struct MigrationUnit {
    migration: Arc<dyn Migration>,
    state: UnitState,
}

impl MigrationUnit {
    /// A unit that has not been applied
    pub fn new(migration: Arc<dyn Migration>) -> Self {
        Self {
            migration,
            state: UnitState::Unapplied,
        }
    }

    /// A unit already recorded as applied
    pub fn applied(migration: Arc<dyn Migration>) -> Self {
        Self {
            migration,
            state: UnitState::Applied,
        }
    }

    pub fn state(&self) -> UnitState {
        self.state
    }

    pub fn migration(&self) -> &Arc<dyn Migration> {
        &self.migration
    }

    pub fn name(&self) -> &str {
        self.migration.name()
    }

    pub fn version(&self) -> i64 {
        self.migration.version()
    }

    /// Run the forward action
    ///
    /// Legal from `Unapplied`, and from `Failed` once the operator has reconciled the
    /// schema by hand.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` from any other state. A configuration error leaves the state
    /// untouched; a structural error moves the unit to `Failed`.
    pub fn apply(&mut self, manager: &SchemaManager<'_>) -> Result<usize, MigrationError> {
        self.guard("applied", &[UnitState::Unapplied, UnitState::Failed])?;
        let ops = self.migration.forward()?;

        self.state = UnitState::Applying;
        log::info!("Applying {} ({})", self.name(), self.version());
        match manager.run(&ops) {
            Ok(count) => {
                self.state = UnitState::Applied;
                Ok(count)
            }
            Err(e) => {
                self.state = UnitState::Failed;
                Err(e)
            }
        }
    }

    /// Run the backward action
    ///
    /// Legal from `Applied`, and from `Failed` as a clean-up attempt.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` from any other state. A configuration error leaves the state
    /// untouched; a structural error moves the unit to `Failed`.
    pub fn revert(&mut self, manager: &SchemaManager<'_>) -> Result<usize, MigrationError> {
        self.guard("reverted", &[UnitState::Applied, UnitState::Failed])?;
        let ops = self.migration.backward()?;

        self.state = UnitState::Reverting;
        log::info!("Reverting {} ({})", self.name(), self.version());
        match manager.run(&ops) {
            Ok(count) => {
                self.state = UnitState::Unapplied;
                Ok(count)
            }
            Err(e) => {
                self.state = UnitState::Failed;
                Err(e)
            }
        }
    }

    fn guard(&self, action: &'static str, allowed: &[UnitState]) -> Result<(), MigrationError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(MigrationError::InvalidTransition {
                name: self.name().to_string(),
                state: self.state,
                action,
            })
        }
    }
}

impl fmt::Debug for MigrationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationUnit")
            .field("name", &self.name())
            .field("version", &self.version())
            .field("state", &self.state)
            .finish()
    }
}
