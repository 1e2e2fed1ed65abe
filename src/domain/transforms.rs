//! Downstream SQL transforms.
//!
//! Views are dropped and recreated so the statements are re-runnable on both
//! backends (SQLite has no `CREATE OR REPLACE VIEW`). Raw tables may hold
//! duplicates from repeated append loads; the `VIEW_*_DAILY` views resolve
//! them to the most recently loaded row per key, by `LOAD_SEQ` first since
//! `LOADED_AT` only has second resolution on SQLite.

use super::error::EtlError;
use super::fx::FxPair;
use crate::ports::warehouse_port::WarehousePort;
use tracing::info;

pub const VIEW_PORTFOLIO_METRICS: &str = "VIEW_PORTFOLIO_METRICS";

/// Statements in dependency order. `join_pair` converts USD market value into
/// the reporting currency; `benchmark` is the symbol reported alongside.
pub fn transform_statements(join_pair: FxPair, benchmark: &str) -> Vec<String> {
    let benchmark = benchmark.replace('\'', "''");
    vec![
        "DROP VIEW IF EXISTS VIEW_PORTFOLIO_METRICS".to_string(),
        "DROP VIEW IF EXISTS VIEW_POSITIONS".to_string(),
        "DROP VIEW IF EXISTS VIEW_FX_DAILY".to_string(),
        "DROP VIEW IF EXISTS VIEW_EQUITY_DAILY".to_string(),
        "CREATE VIEW VIEW_EQUITY_DAILY AS \
         SELECT SYMBOL, DATE, OPEN, HIGH, LOW, CLOSE, VOLUME, SOURCE FROM ( \
           SELECT e.*, ROW_NUMBER() OVER ( \
             PARTITION BY SYMBOL, DATE ORDER BY LOAD_SEQ DESC, LOADED_AT DESC) AS RN \
           FROM EQUITY_DAILY e) ranked \
         WHERE RN = 1"
            .to_string(),
        "CREATE VIEW VIEW_FX_DAILY AS \
         SELECT PAIR, DATE, RATE, SOURCE FROM ( \
           SELECT f.*, ROW_NUMBER() OVER ( \
             PARTITION BY PAIR, DATE ORDER BY LOAD_SEQ DESC, LOADED_AT DESC) AS RN \
           FROM FX_DAILY f) ranked \
         WHERE RN = 1"
            .to_string(),
        "CREATE VIEW VIEW_POSITIONS AS \
         SELECT t.PORTFOLIO_ID, t.SYMBOL, e.DATE, \
                SUM(t.QUANTITY_DELTA) AS QUANTITY, \
                MAX(e.CLOSE) AS CLOSE \
         FROM PORTFOLIO_TRANSACTIONS t \
         JOIN VIEW_EQUITY_DAILY e \
           ON e.SYMBOL = t.SYMBOL AND t.TRANSACTION_DATE <= e.DATE \
         GROUP BY t.PORTFOLIO_ID, t.SYMBOL, e.DATE"
            .to_string(),
        format!(
            "CREATE VIEW VIEW_PORTFOLIO_METRICS AS \
             SELECT p.PORTFOLIO_ID, p.DATE, \
                    COUNT(*) AS POSITIONS, \
                    SUM(p.QUANTITY * p.CLOSE) AS MARKET_VALUE_USD, \
                    SUM(p.QUANTITY * p.CLOSE) * MAX(fx.RATE) AS MARKET_VALUE_CONVERTED, \
                    MAX(b.CLOSE) AS BENCHMARK_CLOSE \
             FROM VIEW_POSITIONS p \
             LEFT JOIN VIEW_FX_DAILY fx ON fx.DATE = p.DATE AND fx.PAIR = '{join_pair}' \
             LEFT JOIN VIEW_EQUITY_DAILY b ON b.DATE = p.DATE AND b.SYMBOL = '{benchmark}' \
             WHERE p.QUANTITY <> 0 \
             GROUP BY p.PORTFOLIO_ID, p.DATE"
        ),
    ]
}

pub fn run_transforms(
    warehouse: &dyn WarehousePort,
    join_pair: FxPair,
    benchmark: &str,
) -> Result<usize, EtlError> {
    let statements = transform_statements(join_pair, benchmark);
    for stmt in &statements {
        warehouse.execute(stmt, &[])?;
    }
    info!(statements = statements.len(), "transforms applied");
    Ok(statements.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn views_created_after_their_dependencies() {
        let statements = transform_statements(FxPair::parse("USDGBP").unwrap(), "SPY");
        let pos = |needle: &str| statements.iter().position(|s| s.contains(needle)).unwrap();
        assert!(pos("CREATE VIEW VIEW_EQUITY_DAILY") < pos("CREATE VIEW VIEW_POSITIONS"));
        assert!(pos("CREATE VIEW VIEW_POSITIONS") < pos("CREATE VIEW VIEW_PORTFOLIO_METRICS"));
        assert!(pos("DROP VIEW IF EXISTS VIEW_PORTFOLIO_METRICS") < pos("DROP VIEW IF EXISTS VIEW_POSITIONS"));
    }

    #[test]
    fn metrics_view_uses_canonical_join_pair() {
        let statements = transform_statements(FxPair::parse("usd/gbp").unwrap(), "SPY");
        assert!(statements.last().unwrap().contains("fx.PAIR = 'USDGBP'"));
    }

    #[test]
    fn benchmark_literal_is_escaped() {
        let statements = transform_statements(FxPair::parse("USDGBP").unwrap(), "O'X");
        assert!(statements.last().unwrap().contains("b.SYMBOL = 'O''X'"));
    }
}
