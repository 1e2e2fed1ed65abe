//! Warehouse access port trait.
//!
//! SQL handed to the port uses `$1`, `$2`, ... placeholders, which both the
//! SQLite and Postgres adapters accept.

use crate::domain::error::EtlError;
use chrono::NaiveDate;

/// A single bound parameter or returned cell.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Date(NaiveDate),
}

impl SqlValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(v) => Some(*v),
            SqlValue::Real(v) if v.fract() == 0.0 => Some(*v as i64),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Integer(v) => Some(*v as f64),
            SqlValue::Real(v) => Some(*v),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            SqlValue::Date(d) => Some(*d),
            SqlValue::Text(s) => crate::domain::bar::parse_date(s),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            SqlValue::Integer(v) => Some(v.to_string()),
            SqlValue::Real(v) => Some(v.to_string()),
            SqlValue::Text(s) => Some(s.clone()),
            SqlValue::Date(d) => Some(crate::domain::bar::format_date(*d)),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl From<Option<f64>> for SqlValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(SqlValue::Null, SqlValue::Real)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(value: NaiveDate) -> Self {
        SqlValue::Date(value)
    }
}

/// Rows to append, with the column names they map to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowBatch {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl RowBatch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Result of a row-returning query. Column names are upper-cased by the
/// adapters so callers see the same names on every backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl QueryResult {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }
}

pub trait WarehousePort {
    /// Run one parameterised statement, returning the affected row count.
    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, EtlError>;

    /// Run several `;`-separated statements with no parameters.
    fn execute_batch(&self, sql: &str) -> Result<(), EtlError>;

    /// First column of the first row, or `None` when no row comes back.
    fn query_scalar(&self, sql: &str, params: &[SqlValue]) -> Result<Option<SqlValue>, EtlError>;

    fn query_rows(&self, sql: &str, params: &[SqlValue]) -> Result<QueryResult, EtlError>;

    /// Append every row of `batch` to `table` in one transaction.
    fn bulk_write(&self, table: &str, batch: &RowBatch) -> Result<usize, EtlError>;
}

/// Build the `INSERT` statement used by adapters for [`WarehousePort::bulk_write`].
pub fn insert_statement(table: &str, columns: &[String]) -> String {
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${i}")).collect();
    format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        columns.join(", "),
        placeholders.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_statement_numbers_placeholders() {
        let sql = insert_statement("FX_DAILY", &["PAIR".into(), "DATE".into(), "RATE".into()]);
        assert_eq!(sql, "INSERT INTO FX_DAILY (PAIR, DATE, RATE) VALUES ($1, $2, $3)");
    }

    #[test]
    fn scalar_conversions() {
        assert_eq!(SqlValue::Integer(3).as_i64(), Some(3));
        assert_eq!(SqlValue::Real(3.0).as_i64(), Some(3));
        assert_eq!(SqlValue::Real(3.5).as_i64(), None);
        assert_eq!(SqlValue::Text("12".into()).as_i64(), Some(12));
        assert_eq!(SqlValue::Null.as_i64(), None);
        assert_eq!(
            SqlValue::Text("2024-03-01".into()).as_date(),
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
        assert_eq!(SqlValue::Integer(7).as_date(), None);
    }

    #[test]
    fn column_index_ignores_case() {
        let result = QueryResult {
            columns: vec!["SOURCE".into(), "LAST_LOADED_DATE".into()],
            rows: vec![],
        };
        assert_eq!(result.column_index("last_loaded_date"), Some(1));
        assert_eq!(result.column_index("missing"), None);
    }
}
