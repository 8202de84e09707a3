//! Checksums over a migration's rendered statements

use crate::migration::render::DdlStatement;
use sha2::{Digest, Sha256};

/// SHA-256 over a migration's name and its rendered forward statements
///
/// Any change to a table descriptor, an index plan, or statement order changes the
/// checksum, so an applied migration edited after the fact is caught by the runner.
pub fn plan_checksum(name: &str, statements: &[DdlStatement]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    for statement in statements {
        hasher.update(b"\n");
        hasher.update(statement.sql.as_bytes());
        hasher.update(b";");
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::render::{DdlRenderer, PostgresRenderer};
    use crate::migration::SchemaOp;
    use crate::schema::{bar_table, Cadence, IndexPlan};

    fn statements(cadence: Cadence) -> Vec<DdlStatement> {
        let table = bar_table(cadence).unwrap();
        let plan = IndexPlan::for_bar_table(&table).unwrap();
        PostgresRenderer::default().render_all(&SchemaOp::create_with_indexes(&table, &plan))
    }

    #[test]
    fn test_checksum_is_stable_hex() {
        let a = plan_checksum("InitStockData", &statements(Cadence::Day));
        let b = plan_checksum("InitStockData", &statements(Cadence::Day));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_checksum_tracks_content_and_order() {
        let day = statements(Cadence::Day);
        let base = plan_checksum("InitStockData", &day);

        assert_ne!(base, plan_checksum("Other", &day));
        assert_ne!(base, plan_checksum("InitStockData", &statements(Cadence::Hour)));

        let mut reordered = day.clone();
        reordered.swap(1, 2);
        assert_ne!(base, plan_checksum("InitStockData", &reordered));
    }
}
