//! Portfolio transaction records and their CSV form.

use super::bar::parse_date;
use super::error::EtlError;
use crate::ports::warehouse_port::{RowBatch, SqlValue};
use chrono::NaiveDate;
use std::io::Read;

pub const TRANSACTION_COLUMNS: [&str; 6] = [
    "TRANSACTION_ID",
    "PORTFOLIO_ID",
    "SYMBOL",
    "QUANTITY_DELTA",
    "TRANSACTION_DATE",
    "TRANSACTION_TYPE",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub transaction_id: String,
    pub portfolio_id: String,
    pub symbol: String,
    pub quantity_delta: f64,
    pub transaction_date: NaiveDate,
    pub transaction_type: String,
}

impl Transaction {
    pub fn to_sql_row(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.transaction_id.clone()),
            SqlValue::Text(self.portfolio_id.clone()),
            SqlValue::Text(self.symbol.clone()),
            SqlValue::Real(self.quantity_delta),
            SqlValue::Date(self.transaction_date),
            SqlValue::Text(self.transaction_type.clone()),
        ]
    }
}

pub fn transaction_batch(transactions: &[Transaction]) -> RowBatch {
    RowBatch {
        columns: TRANSACTION_COLUMNS.iter().map(|c| c.to_string()).collect(),
        rows: transactions.iter().map(Transaction::to_sql_row).collect(),
    }
}

const SOURCE: &str = "transactions_csv";

/// Read transactions from CSV. Header names are matched case-insensitively
/// against [`TRANSACTION_COLUMNS`]; any missing column is a `SchemaMismatch`
/// naming every absent column.
pub fn read_transactions<R: Read>(reader: R) -> Result<Vec<Transaction>, EtlError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr
        .headers()
        .map_err(|e| EtlError::schema(SOURCE, format!("CSV header error: {e}")))?
        .clone();

    let mut indices = [0usize; 6];
    let mut missing = Vec::new();
    for (slot, column) in indices.iter_mut().zip(TRANSACTION_COLUMNS) {
        match headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(column))
        {
            Some(i) => *slot = i,
            None => missing.push(column.to_lowercase()),
        }
    }
    if !missing.is_empty() {
        return Err(EtlError::schema(
            SOURCE,
            format!("missing columns in CSV: {}", missing.join(", ")),
        ));
    }

    let mut transactions = Vec::new();
    for (line, result) in rdr.records().enumerate() {
        let record =
            result.map_err(|e| EtlError::schema(SOURCE, format!("CSV parse error: {e}")))?;
        let field = |i: usize| record.get(indices[i]).map(str::trim).unwrap_or("");
        let row = line + 2;

        let quantity_delta: f64 = field(3).parse().map_err(|_| {
            EtlError::schema(SOURCE, format!("row {row}: invalid quantity_delta '{}'", field(3)))
        })?;
        let transaction_date = parse_date(field(4)).ok_or_else(|| {
            EtlError::schema(SOURCE, format!("row {row}: invalid transaction_date '{}'", field(4)))
        })?;
        if field(0).is_empty() {
            return Err(EtlError::schema(SOURCE, format!("row {row}: empty transaction_id")));
        }

        transactions.push(Transaction {
            transaction_id: field(0).to_string(),
            portfolio_id: field(1).to_string(),
            symbol: field(2).to_uppercase(),
            quantity_delta,
            transaction_date,
            transaction_type: field(5).to_uppercase(),
        });
    }

    Ok(transactions)
}
