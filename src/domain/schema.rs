//! Warehouse DDL.
//!
//! The statements use only types and syntax accepted by both SQLite and
//! Postgres (`DOUBLE PRECISION`, `BIGINT`, `DATE`, `TEXT`,
//! `CREATE ... IF NOT EXISTS`).

use super::error::EtlError;
use crate::ports::warehouse_port::WarehousePort;
use std::fs;
use std::path::Path;
use tracing::info;

pub const DEFAULT_DDL: &str = "
CREATE TABLE IF NOT EXISTS EQUITY_DAILY (
    SYMBOL TEXT NOT NULL,
    DATE DATE NOT NULL,
    OPEN DOUBLE PRECISION,
    HIGH DOUBLE PRECISION,
    LOW DOUBLE PRECISION,
    CLOSE DOUBLE PRECISION NOT NULL,
    VOLUME BIGINT NOT NULL DEFAULT 0,
    SOURCE TEXT,
    LOADED_AT TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    LOAD_SEQ BIGINT NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS IDX_EQUITY_DAILY_KEY ON EQUITY_DAILY (SYMBOL, DATE);

CREATE TABLE IF NOT EXISTS FX_DAILY (
    PAIR TEXT NOT NULL,
    DATE DATE NOT NULL,
    RATE DOUBLE PRECISION NOT NULL,
    SOURCE TEXT,
    LOADED_AT TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    LOAD_SEQ BIGINT NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS IDX_FX_DAILY_KEY ON FX_DAILY (PAIR, DATE);

CREATE TABLE IF NOT EXISTS LOAD_METADATA (
    SOURCE TEXT PRIMARY KEY,
    LAST_LOADED_DATE DATE NOT NULL,
    UPDATED_AT TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS DQ_AUDIT_LOG (
    RUN_ID TEXT NOT NULL,
    RUN_DATE DATE NOT NULL,
    TASK_NAME TEXT NOT NULL,
    STATUS TEXT NOT NULL,
    RECORD_COUNT BIGINT,
    ERROR_MESSAGE TEXT,
    CHECKED_AT TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS PORTFOLIO_TRANSACTIONS (
    TRANSACTION_ID TEXT PRIMARY KEY,
    PORTFOLIO_ID TEXT NOT NULL,
    SYMBOL TEXT NOT NULL,
    QUANTITY_DELTA DOUBLE PRECISION NOT NULL,
    TRANSACTION_DATE DATE NOT NULL,
    TRANSACTION_TYPE TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS PORTFOLIO_TRANSACTIONS_STAGE (
    TRANSACTION_ID TEXT,
    PORTFOLIO_ID TEXT,
    SYMBOL TEXT,
    QUANTITY_DELTA DOUBLE PRECISION,
    TRANSACTION_DATE DATE,
    TRANSACTION_TYPE TEXT
);
";

/// Split a DDL script on `;`, trimming and dropping empty statements.
pub fn split_statements(script: &str) -> Vec<String> {
    script
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Apply each statement of `script` in order. Returns the statement count.
pub fn apply_script(warehouse: &dyn WarehousePort, script: &str) -> Result<usize, EtlError> {
    let statements = split_statements(script);
    for stmt in &statements {
        info!("applying: {}...", preview(stmt, 80));
        warehouse.execute(stmt, &[])?;
    }
    Ok(statements.len())
}

pub fn apply_default(warehouse: &dyn WarehousePort) -> Result<usize, EtlError> {
    apply_script(warehouse, DEFAULT_DDL)
}

/// Apply DDL files in the order given.
pub fn apply_files<P: AsRef<Path>>(
    warehouse: &dyn WarehousePort,
    files: &[P],
) -> Result<usize, EtlError> {
    let mut applied = 0;
    for file in files {
        let script = fs::read_to_string(file.as_ref())?;
        info!(file = %file.as_ref().display(), "applying ddl file");
        applied += apply_script(warehouse, &script)?;
    }
    Ok(applied)
}

fn preview(stmt: &str, limit: usize) -> String {
    let flat: String = stmt.split_whitespace().collect::<Vec<_>>().join(" ");
    flat.chars().take(limit).collect()
}
