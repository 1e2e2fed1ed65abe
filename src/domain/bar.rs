//! Daily equity bar representation.
//!
//! Extractors emit [`RawEquityRow`] (every field as received, possibly missing
//! or unparsable); the cleaner turns those into typed [`EquityBar`]s.

use crate::ports::warehouse_port::{RowBatch, SqlValue};
use chrono::NaiveDate;

/// Warehouse column names for `EQUITY_DAILY`, in insert order.
pub const EQUITY_COLUMNS: [&str; 8] = [
    "SYMBOL", "DATE", "OPEN", "HIGH", "LOW", "CLOSE", "VOLUME", "SOURCE",
];

pub const EQUITY_KEY: [&str; 2] = ["SYMBOL", "DATE"];

/// A row straight from a provider payload, before type coercion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEquityRow {
    pub symbol: Option<String>,
    pub date: Option<String>,
    pub open: Option<String>,
    pub high: Option<String>,
    pub low: Option<String>,
    pub close: Option<String>,
    pub volume: Option<String>,
    pub source: String,
}

/// One cleaned daily bar. Benchmark rows carry only a close, so the other
/// prices are optional.
#[derive(Debug, Clone, PartialEq)]
pub struct EquityBar {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: f64,
    pub volume: i64,
    pub source: String,
}

impl EquityBar {
    pub fn key(&self) -> (&str, NaiveDate) {
        (&self.symbol, self.date)
    }

    pub fn to_sql_row(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.symbol.clone()),
            SqlValue::Date(self.date),
            self.open.into(),
            self.high.into(),
            self.low.into(),
            SqlValue::Real(self.close),
            SqlValue::Integer(self.volume),
            SqlValue::Text(self.source.clone()),
        ]
    }

    pub fn to_raw(&self) -> RawEquityRow {
        RawEquityRow {
            symbol: Some(self.symbol.clone()),
            date: Some(format_date(self.date)),
            open: self.open.map(|v| v.to_string()),
            high: self.high.map(|v| v.to_string()),
            low: self.low.map(|v| v.to_string()),
            close: Some(self.close.to_string()),
            volume: Some(self.volume.to_string()),
            source: self.source.clone(),
        }
    }
}

pub fn equity_batch(bars: &[EquityBar]) -> RowBatch {
    RowBatch {
        columns: EQUITY_COLUMNS.iter().map(|c| c.to_string()).collect(),
        rows: bars.iter().map(EquityBar::to_sql_row).collect(),
    }
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Lenient date parser for provider payloads. Returns `None` for anything
/// that is not a calendar date.
pub fn parse_date(input: &str) -> Option<NaiveDate> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    // Timestamps such as "2024-01-02 00:00:00" keep only the date part.
    let head = trimmed.split([' ', 'T']).next().unwrap_or(trimmed);
    ["%Y-%m-%d", "%Y%m%d", "%Y/%m/%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(head, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bar() -> EquityBar {
        EquityBar {
            symbol: "AAPL".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            open: Some(187.15),
            high: Some(188.44),
            low: Some(183.89),
            close: 185.64,
            volume: 82_488_700,
            source: "stooq".into(),
        }
    }

    #[test]
    fn parse_date_accepts_provider_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 2);
        assert_eq!(parse_date("2024-01-02"), expected);
        assert_eq!(parse_date(" 2024-01-02 "), expected);
        assert_eq!(parse_date("20240102"), expected);
        assert_eq!(parse_date("2024/01/02"), expected);
        assert_eq!(parse_date("2024-01-02 00:00:00"), expected);
        assert_eq!(parse_date("2024-01-02T00:00:00Z"), expected);
    }

    #[test]
    fn parse_date_rejects_garbage() {
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("not a date"), None);
        assert_eq!(parse_date("2024-13-45"), None);
    }

    #[test]
    fn sql_row_matches_column_order() {
        let row = sample_bar().to_sql_row();
        assert_eq!(row.len(), EQUITY_COLUMNS.len());
        assert_eq!(row[0], SqlValue::Text("AAPL".into()));
        assert_eq!(row[1], SqlValue::Date(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()));
        assert_eq!(row[5], SqlValue::Real(185.64));
        assert_eq!(row[6], SqlValue::Integer(82_488_700));
    }

    #[test]
    fn benchmark_bar_writes_nulls_for_missing_prices() {
        let bar = EquityBar {
            open: None,
            high: None,
            low: None,
            ..sample_bar()
        };
        let row = bar.to_sql_row();
        assert_eq!(row[2], SqlValue::Null);
        assert_eq!(row[3], SqlValue::Null);
        assert_eq!(row[4], SqlValue::Null);
    }

    #[test]
    fn to_raw_keeps_every_field() {
        let raw = sample_bar().to_raw();
        assert_eq!(raw.symbol.as_deref(), Some("AAPL"));
        assert_eq!(raw.date.as_deref(), Some("2024-01-02"));
        assert_eq!(raw.close.as_deref(), Some("185.64"));
        assert_eq!(raw.volume.as_deref(), Some("82488700"));
    }
}
