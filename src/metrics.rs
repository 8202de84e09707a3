//! Optional observability hooks.
//!
//! With the `metrics` feature, statement counts, failures and durations are recorded
//! through `opentelemetry` meters named `stockbar_*`. With the `tracing` feature, every
//! statement and every migration action runs inside a span.

#[cfg(feature = "metrics")]
pub use otel::{StockbarMetrics, METRICS};

#[cfg(feature = "metrics")]
mod otel {
    use once_cell::sync::Lazy;
    use opentelemetry::{
        global,
        metrics::{Counter, Histogram},
        KeyValue,
    };
    use std::time::Duration;

    pub static METRICS: Lazy<StockbarMetrics> = Lazy::new(StockbarMetrics::init);

    pub struct StockbarMetrics {
        pub statements_total: Counter<u64>,
        pub statement_errors_total: Counter<u64>,
        pub statement_duration: Histogram<f64>,
        pub migrations_total: Counter<u64>,
    }

    impl StockbarMetrics {
        pub fn init() -> Self {
            let meter = global::meter("stockbar");

            let statements_total = meter
                .u64_counter("stockbar_statements_total")
                .with_description("Total statements executed")
                .build();

            let statement_errors_total = meter
                .u64_counter("stockbar_statement_errors_total")
                .with_description("Statements that returned an error")
                .build();

            let statement_duration = meter
                .f64_histogram("stockbar_statement_duration_seconds")
                .with_description("Duration of statements")
                .build();

            let migrations_total = meter
                .u64_counter("stockbar_migrations_total")
                .with_description("Migration actions completed, by direction")
                .build();

            Self {
                statements_total,
                statement_errors_total,
                statement_duration,
                migrations_total,
            }
        }

        pub fn record_statement(&self, elapsed: Duration) {
            self.statements_total.add(1, &[]);
            self.statement_duration.record(elapsed.as_secs_f64(), &[]);
        }

        pub fn record_statement_error(&self) {
            self.statement_errors_total.add(1, &[]);
        }

        pub fn record_migration(&self, direction: &'static str) {
            self.migrations_total
                .add(1, &[KeyValue::new("direction", direction)]);
        }
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{info_span, Span};

    const MAX_SQL_IN_SPAN: usize = 120;

    /// Span around a single statement; long SQL is cut to keep spans small
    pub fn execute_statement_span(sql: &str) -> Span {
        let sql = sql.trim();
        let shown = match sql.char_indices().nth(MAX_SQL_IN_SPAN) {
            Some((idx, _)) => &sql[..idx],
            None => sql,
        };
        info_span!("stockbar.statement", sql = %shown)
    }

    /// Span around one migration's forward or backward action
    pub fn migration_span(name: &str, version: i64, direction: &'static str) -> Span {
        info_span!("stockbar.migration", name = %name, version, direction)
    }
}
