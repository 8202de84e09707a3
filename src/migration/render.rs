//! Rendering structural operations to engine-specific DDL.
//!
//! The renderer is the only place that knows SQL dialect. `PostgresRenderer` builds each
//! statement with `sea-query` and its `PostgresQueryBuilder`.
//!
//! Creates are rendered without `IF NOT EXISTS` and drops without `IF EXISTS`: applying
//! twice, or reverting twice, must fail loudly rather than pass as a no-op.

use crate::migration::operation::SchemaOp;
use crate::schema::{ColumnKind, ColumnSpec, IndexSpec, KeySpec, TableDescriptor};
use sea_query::{
    Alias, ColumnDef, Index, IndexCreateStatement, IntoIden, PostgresQueryBuilder, SchemaName,
    Table, TableName,
};

/// A structural operation together with the statement that performs it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DdlStatement {
    pub op: SchemaOp,
    pub sql: String,
}

/// Turns structural operations into statements for one database engine
pub trait DdlRenderer {
    fn render(&self, op: &SchemaOp) -> DdlStatement;

    fn render_all(&self, ops: &[SchemaOp]) -> Vec<DdlStatement> {
        ops.iter().map(|op| self.render(op)).collect()
    }
}

/// `PostgreSQL` dialect
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostgresRenderer {
    schema: Option<String>,
}

impl PostgresRenderer {
    /// Qualify every table and index with `schema`
    pub fn with_schema(schema: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
        }
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    fn table_ref(&self, table: &str) -> TableName {
        let iden = Alias::new(table).into_iden();
        match &self.schema {
            Some(schema) => TableName(Some(SchemaName::from(schema.clone())), iden),
            None => TableName(None, iden),
        }
    }

    fn column_def(column: &ColumnSpec) -> ColumnDef {
        let mut def = ColumnDef::new(Alias::new(column.name.as_str()));
        match column.kind {
            // `serial` rather than an identity column: identity columns are not accepted
            // on partitioned tables before PostgreSQL 17.
            ColumnKind::Serial => def.custom(Alias::new("serial")),
            ColumnKind::Timestamp => def.timestamp(),
            ColumnKind::VarChar(len) => def.string_len(len),
            ColumnKind::Decimal { precision, scale } => def.decimal_len(precision, scale),
            ColumnKind::BigInt => def.big_integer(),
        };
        if column.nullable {
            def.null();
        } else {
            def.not_null();
        }
        def
    }

    fn key_index(key: &KeySpec) -> IndexCreateStatement {
        let mut index = Index::create();
        index.name(key.name.as_str());
        for column in &key.columns {
            index.col(Alias::new(column.as_str()));
        }
        index
    }

    fn create_table(&self, table: &TableDescriptor) -> String {
        let mut stmt = Table::create();
        stmt.table(self.table_ref(table.name()));

        for column in table.columns() {
            let mut def = Self::column_def(column);
            stmt.col(&mut def);
        }
        for key in table.unique_constraints() {
            let mut unique = Self::key_index(key);
            unique.unique();
            stmt.index(&mut unique);
        }
        let mut primary = Self::key_index(table.primary_key());
        stmt.primary_key(&mut primary);
        stmt.extra(table.partition().clause());

        stmt.build(PostgresQueryBuilder)
    }

    fn drop_table(&self, table: &TableDescriptor) -> String {
        Table::drop()
            .table(self.table_ref(table.name()))
            .build(PostgresQueryBuilder)
    }

    fn create_index(&self, index: &IndexSpec) -> String {
        let mut stmt = Index::create();
        stmt.name(index.name.as_str())
            .table(self.table_ref(&index.table));
        for column in &index.columns {
            stmt.col(Alias::new(column.as_str()));
        }
        stmt.build(PostgresQueryBuilder)
    }

    fn drop_index(&self, index: &IndexSpec) -> String {
        Index::drop()
            .name(index.name.as_str())
            .table(self.table_ref(&index.table))
            .build(PostgresQueryBuilder)
    }
}

impl DdlRenderer for PostgresRenderer {
    fn render(&self, op: &SchemaOp) -> DdlStatement {
        let sql = match op {
            SchemaOp::CreateTable(t) => self.create_table(t),
            SchemaOp::DropTable(t) => self.drop_table(t),
            SchemaOp::CreateIndex(i) => self.create_index(i),
            SchemaOp::DropIndex(i) => self.drop_index(i),
        };
        DdlStatement {
            op: op.clone(),
            sql,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{bar_table, Cadence, IndexPlan};

    fn stock1d() -> TableDescriptor {
        bar_table(Cadence::Day).unwrap()
    }

    #[test]
    fn test_create_table_carries_keys_and_partitioning() {
        let sql = PostgresRenderer::default()
            .render(&SchemaOp::CreateTable(stock1d()))
            .sql;

        assert!(sql.starts_with("CREATE TABLE \"stock1d\""), "{sql}");
        assert!(!sql.contains("IF NOT EXISTS"), "{sql}");
        for column in ["id", "datetime", "ticker", "open", "high", "low", "close", "volume"] {
            assert!(sql.contains(&format!("\"{column}\"")), "missing {column}: {sql}");
        }
        assert!(sql.contains("serial"), "{sql}");
        assert!(sql.contains("CONSTRAINT \"stock1d_unique\" UNIQUE"), "{sql}");
        assert!(sql.contains("CONSTRAINT \"pk_stock1d\" PRIMARY KEY"), "{sql}");
        assert!(sql.trim_end().ends_with("PARTITION BY RANGE (\"datetime\")"), "{sql}");
    }

    #[test]
    fn test_index_statements() {
        let table = stock1d();
        let plan = IndexPlan::for_bar_table(&table).unwrap();
        let renderer = PostgresRenderer::default();

        let create = renderer.render(&SchemaOp::CreateIndex(plan.indexes()[0].clone())).sql;
        assert!(create.starts_with("CREATE INDEX \"idx_stock1d_ticker_datetime\""), "{create}");
        assert!(create.contains("ON \"stock1d\""), "{create}");

        let drop = renderer.render(&SchemaOp::DropIndex(plan.indexes()[1].clone())).sql;
        assert!(drop.starts_with("DROP INDEX"), "{drop}");
        assert!(drop.contains("\"idx_stock1d_datetime\""), "{drop}");
        assert!(!drop.contains("IF EXISTS"), "{drop}");
    }

    #[test]
    fn test_schema_qualification() {
        let renderer = PostgresRenderer::with_schema("market");
        assert_eq!(renderer.schema(), Some("market"));

        let sql = renderer.render(&SchemaOp::DropTable(stock1d())).sql;
        assert_eq!(sql, "DROP TABLE \"market\".\"stock1d\"");
    }

    #[test]
    fn test_schema_built_at_runtime() {
        let schema = format!("tenant_{}", 7);
        let renderer = PostgresRenderer::with_schema(schema);
        let table = bar_table(Cadence::Minute).unwrap();
        let plan = IndexPlan::for_bar_table(&table).unwrap();

        let create = renderer.render(&SchemaOp::CreateTable(table)).sql;
        assert!(create.starts_with("CREATE TABLE \"tenant_7\".\"stock1m\""), "{create}");

        let drop = renderer.render(&SchemaOp::DropIndex(plan.indexes()[1].clone())).sql;
        assert_eq!(drop, "DROP INDEX \"tenant_7\".\"idx_stock1m_datetime\"");
    }

    #[test]
    fn test_render_all_keeps_order() {
        let table = stock1d();
        let plan = IndexPlan::for_bar_table(&table).unwrap();
        let ops = SchemaOp::create_with_indexes(&table, &plan);

        let rendered = PostgresRenderer::default().render_all(&ops);
        let rendered_ops: Vec<SchemaOp> = rendered.into_iter().map(|s| s.op).collect();
        assert_eq!(rendered_ops, ops);
    }
}
