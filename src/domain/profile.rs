//! Dataset profiling for the local extract job.

use super::bar::{EQUITY_COLUMNS, EquityBar};
use super::fx::{FX_COLUMNS, FxRate};
use crate::ports::warehouse_port::SqlValue;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetProfile {
    pub dataset: String,
    pub rows: usize,
    pub columns: Vec<String>,
    pub null_counts: BTreeMap<String, usize>,
    pub duplicate_key_rows: usize,
}

impl DatasetProfile {
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }
}

pub fn profile_equities(dataset: &str, bars: &[EquityBar]) -> DatasetProfile {
    let rows: Vec<Vec<SqlValue>> = bars.iter().map(EquityBar::to_sql_row).collect();
    let mut seen = HashSet::new();
    let duplicates = bars.iter().filter(|b| !seen.insert(b.key())).count();
    build(dataset, &EQUITY_COLUMNS, &rows, duplicates)
}

pub fn profile_fx(dataset: &str, rates: &[FxRate]) -> DatasetProfile {
    let rows: Vec<Vec<SqlValue>> = rates.iter().map(FxRate::to_sql_row).collect();
    let mut seen = HashSet::new();
    let duplicates = rates.iter().filter(|r| !seen.insert((r.pair, r.date))).count();
    build(dataset, &FX_COLUMNS, &rows, duplicates)
}

fn build(dataset: &str, columns: &[&str], rows: &[Vec<SqlValue>], duplicates: usize) -> DatasetProfile {
    let null_counts = columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let nulls = rows
                .iter()
                .filter(|row| row.get(i).is_none_or(SqlValue::is_null))
                .count();
            (c.to_string(), nulls)
        })
        .collect();
    DatasetProfile {
        dataset: dataset.to_string(),
        rows: rows.len(),
        columns: columns.iter().map(|c| c.to_string()).collect(),
        null_counts,
        duplicate_key_rows: duplicates,
    }
}
