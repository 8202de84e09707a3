//! SchemaManager - runs structural operations against an execution context

use crate::executor::{MayPostgresExecutor, SqlExecutor};
use crate::migration::error::StatementError;
use crate::migration::operation::SchemaOp;
use crate::migration::render::{DdlRenderer, DdlStatement, PostgresRenderer};
use crate::migration::MigrationError;
use crate::schema::{IndexSpec, TableDescriptor};

/// Something that can run one structural statement and say whether it succeeded
///
/// Implemented by the `PostgreSQL` executor and by the in-memory catalog used in tests.
/// The execution context is always passed in explicitly; nothing holds a process-wide
/// connection.
pub trait StructuralContext {
    /// Run one statement
    ///
    /// # Errors
    ///
    /// Returns a `StatementError` classifying the refusal (missing object, duplicate
    /// object, or anything else the engine reported).
    fn apply(&self, statement: &DdlStatement) -> Result<(), StatementError>;
}

impl StructuralContext for MayPostgresExecutor {
    fn apply(&self, statement: &DdlStatement) -> Result<(), StatementError> {
        // DDL statements carry no parameters
        self.execute(&statement.sql, &[])
            .map(|_| ())
            .map_err(StatementError::from)
    }
}

/// `SchemaManager` renders structural operations and runs them, in order, against a context
///
/// A run stops at the first failing statement. Statements before it have already taken
/// effect unless the caller wrapped the run in a transaction.
pub struct SchemaManager<'a> {
    context: &'a dyn StructuralContext,
    renderer: Box<dyn DdlRenderer + 'a>,
}

impl<'a> SchemaManager<'a> {
    /// Create a `SchemaManager` rendering unqualified `PostgreSQL` DDL
    pub fn new(context: &'a dyn StructuralContext) -> Self {
        Self::with_renderer(context, PostgresRenderer::default())
    }

    /// Create a `SchemaManager` that qualifies every object with `schema`
    pub fn with_schema(context: &'a dyn StructuralContext, schema: &str) -> Self {
        Self::with_renderer(context, PostgresRenderer::with_schema(schema))
    }

    pub fn with_renderer(context: &'a dyn StructuralContext, renderer: impl DdlRenderer + 'a) -> Self {
        Self {
            context,
            renderer: Box::new(renderer),
        }
    }

    /// Render `ops` without running anything
    pub fn render(&self, ops: &[SchemaOp]) -> Vec<DdlStatement> {
        self.renderer.render_all(ops)
    }

    /// Run `ops` in order
    ///
    /// Returns the number of statements run.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Structural` carrying the zero-based position and SQL of the
    /// first statement the context refused. No later statement is attempted.
    pub fn run(&self, ops: &[SchemaOp]) -> Result<usize, MigrationError> {
        for (index, statement) in self.render(ops).into_iter().enumerate() {
            log::debug!("[{}] {}: {}", index, statement.op, statement.sql);

            if let Err(source) = self.context.apply(&statement) {
                log::error!(
                    "Statement #{} ({}) failed: {}",
                    index,
                    statement.op,
                    source
                );
                return Err(MigrationError::Structural {
                    index,
                    sql: statement.sql,
                    source,
                });
            }
        }
        Ok(ops.len())
    }

    /// Create a table with its constraints and partitioning declaration
    ///
    /// # Errors
    ///
    /// See [`SchemaManager::run`].
    pub fn create_table(&self, table: &TableDescriptor) -> Result<(), MigrationError> {
        self.run(&[SchemaOp::CreateTable(table.clone())]).map(|_| ())
    }

    /// Drop a table
    ///
    /// # Errors
    ///
    /// See [`SchemaManager::run`].
    pub fn drop_table(&self, table: &TableDescriptor) -> Result<(), MigrationError> {
        self.run(&[SchemaOp::DropTable(table.clone())]).map(|_| ())
    }

    /// Create an index
    ///
    /// # Errors
    ///
    /// See [`SchemaManager::run`].
    pub fn create_index(&self, index: &IndexSpec) -> Result<(), MigrationError> {
        self.run(&[SchemaOp::CreateIndex(index.clone())]).map(|_| ())
    }

    /// Drop an index
    ///
    /// # Errors
    ///
    /// See [`SchemaManager::run`].
    pub fn drop_index(&self, index: &IndexSpec) -> Result<(), MigrationError> {
        self.run(&[SchemaOp::DropIndex(index.clone())]).map(|_| ())
    }
}
