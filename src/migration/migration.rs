//! Migration trait definition

use super::operation::{invert_sequence, verify_reversal, SchemaOp};
use super::schema_manager::SchemaManager;
use super::MigrationError;

/// Trait that all migrations must implement
///
/// A migration describes its forward action as an ordered list of structural operations.
/// The backward action defaults to the exact inverse of the forward one; a migration that
/// writes its backward action out by hand should keep [`Migration::verify`] passing.
///
/// Execution is synchronous: each statement is a blocking call on the context.
pub trait Migration: Send + Sync {
    /// Get the migration name (human-readable identifier)
    fn name(&self) -> &str;

    /// Get the migration version (timestamp: YYYYMMDDHHMMSS), which orders migrations
    fn version(&self) -> i64;

    /// Operations that apply the migration
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Configuration` if the migration's tables cannot be described.
    fn forward(&self) -> Result<Vec<SchemaOp>, MigrationError>;

    /// Operations that undo the migration
    ///
    /// # Errors
    ///
    /// Same as [`Migration::forward`].
    fn backward(&self) -> Result<Vec<SchemaOp>, MigrationError> {
        Ok(invert_sequence(&self.forward()?))
    }

    /// Apply the migration; returns the number of statements run
    ///
    /// # Errors
    ///
    /// Configuration errors are returned before any statement runs. A structural error
    /// means every statement before the failing one has already run.
    fn up(&self, manager: &SchemaManager<'_>) -> Result<usize, MigrationError> {
        let ops = self.forward()?;
        manager.run(&ops)
    }

    /// Roll the migration back; returns the number of statements run
    ///
    /// # Errors
    ///
    /// Same as [`Migration::up`].
    fn down(&self, manager: &SchemaManager<'_>) -> Result<usize, MigrationError> {
        let ops = self.backward()?;
        manager.run(&ops)
    }

    /// Check that the backward action exactly undoes the forward action
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::ReversalMismatch` at the first diverging step.
    fn verify(&self) -> Result<(), MigrationError> {
        verify_reversal(self.name(), &self.forward()?, &self.backward()?)
    }
}
