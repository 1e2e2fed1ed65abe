//! Warehouse loaders.
//!
//! [`AppendLoader`] bulk-appends cleaned batches; duplicates across runs are
//! tolerated at the storage layer and resolved by the `VIEW_*_DAILY` views.
//! Each append stamps its rows with the next `LOAD_SEQ` for the table, so the
//! views can order loads that share a `LOADED_AT` second.
//! [`MergeLoader`] implements the staging pattern: empty the stage, bulk-load
//! it, then upsert it into the target by primary key. The stage is never a
//! source of truth. Neither loader retries; errors propagate.

use super::bar::{EquityBar, equity_batch};
use super::error::EtlError;
use super::fx::{FxRate, fx_batch};
use super::transaction::{TRANSACTION_COLUMNS, Transaction, transaction_batch};
use crate::ports::warehouse_port::{RowBatch, SqlValue, WarehousePort};
use std::collections::HashMap;
use tracing::{info, warn};

pub const EQUITY_TABLE: &str = "EQUITY_DAILY";
pub const FX_TABLE: &str = "FX_DAILY";
pub const TRANSACTIONS_TABLE: &str = "PORTFOLIO_TRANSACTIONS";
pub const TRANSACTIONS_STAGE: &str = "PORTFOLIO_TRANSACTIONS_STAGE";
pub const LOAD_SEQ: &str = "LOAD_SEQ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadReport {
    pub rows_written: usize,
}

pub struct AppendLoader<'a> {
    warehouse: &'a dyn WarehousePort,
}

impl<'a> AppendLoader<'a> {
    pub fn new(warehouse: &'a dyn WarehousePort) -> Self {
        Self { warehouse }
    }

    pub fn load_equities(&self, bars: &[EquityBar]) -> Result<LoadReport, EtlError> {
        self.append(EQUITY_TABLE, &equity_batch(bars))
    }

    pub fn load_fx(&self, rates: &[FxRate]) -> Result<LoadReport, EtlError> {
        self.append(FX_TABLE, &fx_batch(rates))
    }

    fn append(&self, table: &str, batch: &RowBatch) -> Result<LoadReport, EtlError> {
        if batch.is_empty() {
            return Ok(LoadReport::default());
        }
        let seq = self.next_load_seq(table)?;
        let stamped = with_load_seq(batch, seq);
        let rows_written = self.warehouse.bulk_write(table, &stamped)?;
        info!(table, rows = rows_written, load_seq = seq, "appended");
        Ok(LoadReport { rows_written })
    }

    fn next_load_seq(&self, table: &str) -> Result<i64, EtlError> {
        let current = self
            .warehouse
            .query_scalar(&format!("SELECT MAX({LOAD_SEQ}) FROM {table}"), &[])?
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        Ok(current + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeReport {
    pub staged: usize,
    pub merged: u64,
}

pub struct MergeLoader<'a> {
    warehouse: &'a dyn WarehousePort,
}

impl<'a> MergeLoader<'a> {
    pub fn new(warehouse: &'a dyn WarehousePort) -> Self {
        Self { warehouse }
    }

    /// A `TRANSACTION_ID` repeated within one batch keeps its last row.
    pub fn load_transactions(&self, transactions: &[Transaction]) -> Result<MergeReport, EtlError> {
        let batch = last_per_id(transactions);
        if batch.len() < transactions.len() {
            warn!(
                dropped = transactions.len() - batch.len(),
                "repeated TRANSACTION_ID in batch, keeping the last row"
            );
        }
        self.truncate_stage()?;
        let staged = self
            .warehouse
            .bulk_write(TRANSACTIONS_STAGE, &transaction_batch(&batch))?;
        let merged = self.warehouse.execute(&merge_statement(), &[])?;
        info!(staged, merged, target = TRANSACTIONS_TABLE, "merged stage into target");
        Ok(MergeReport { staged, merged })
    }

    fn truncate_stage(&self) -> Result<(), EtlError> {
        self.warehouse
            .execute(&format!("DELETE FROM {TRANSACTIONS_STAGE}"), &[])?;
        let remaining = self
            .warehouse
            .query_scalar(&format!("SELECT COUNT(*) FROM {TRANSACTIONS_STAGE}"), &[])?
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        if remaining != 0 {
            return Err(EtlError::persistence(format!(
                "{TRANSACTIONS_STAGE} still holds {remaining} rows after truncate"
            )));
        }
        Ok(())
    }
}

fn with_load_seq(batch: &RowBatch, seq: i64) -> RowBatch {
    let mut columns = batch.columns.clone();
    columns.push(LOAD_SEQ.to_string());
    let rows = batch
        .rows
        .iter()
        .map(|row| {
            let mut row = row.clone();
            row.push(SqlValue::Integer(seq));
            row
        })
        .collect();
    RowBatch { columns, rows }
}

/// Keeps first-seen order of ids, with the values of each id's last row.
fn last_per_id(transactions: &[Transaction]) -> Vec<Transaction> {
    let mut position: HashMap<&str, usize> = HashMap::new();
    let mut out: Vec<Transaction> = Vec::with_capacity(transactions.len());
    for tx in transactions {
        match position.get(tx.transaction_id.as_str()) {
            Some(&i) => out[i] = tx.clone(),
            None => {
                position.insert(tx.transaction_id.as_str(), out.len());
                out.push(tx.clone());
            }
        }
    }
    out
}

/// Upsert from stage into target. The `WHERE true` is required by SQLite to
/// disambiguate `INSERT ... SELECT ... ON CONFLICT`.
fn merge_statement() -> String {
    let columns = TRANSACTION_COLUMNS.join(", ");
    let updates: Vec<String> = TRANSACTION_COLUMNS[1..]
        .iter()
        .map(|c| format!("{c} = excluded.{c}"))
        .collect();
    format!(
        "INSERT INTO {TRANSACTIONS_TABLE} ({columns}) \
         SELECT {columns} FROM {TRANSACTIONS_STAGE} WHERE true \
         ON CONFLICT (TRANSACTION_ID) DO UPDATE SET {}",
        updates.join(", ")
    )
}
