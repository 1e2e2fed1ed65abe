//! FX rates and currency-pair normalization.
//!
//! Providers disagree on pair notation: Alpha Vantage and Stooq use a
//! concatenated code (`USDGBP`), the ECB feed is naturally expressed as
//! `USD/GBP`. Internally every pair is an [`FxPair`] and is stored in the
//! concatenated form.

use crate::ports::warehouse_port::{RowBatch, SqlValue};
use chrono::NaiveDate;
use std::fmt;

pub const FX_COLUMNS: [&str; 4] = ["PAIR", "DATE", "RATE", "SOURCE"];

pub const FX_KEY: [&str; 2] = ["PAIR", "DATE"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FxPair {
    base: [u8; 3],
    quote: [u8; 3],
}

impl FxPair {
    /// Parse `USDGBP`, `usdgbp`, `USD/GBP` or `usd/gbp`.
    pub fn parse(input: &str) -> Option<Self> {
        let upper = input.trim().to_ascii_uppercase();
        let (base, quote) = match upper.split_once('/') {
            Some((b, q)) => (b.trim().to_string(), q.trim().to_string()),
            None if upper.len() == 6 && upper.is_ascii() => (upper[..3].to_string(), upper[3..].to_string()),
            None => return None,
        };
        Some(Self {
            base: currency_code(&base)?,
            quote: currency_code(&quote)?,
        })
    }

    pub fn base(&self) -> &str {
        std::str::from_utf8(&self.base).unwrap_or("???")
    }

    pub fn quote(&self) -> &str {
        std::str::from_utf8(&self.quote).unwrap_or("???")
    }

    /// Slash-delimited form, e.g. `USD/GBP`.
    pub fn slashed(&self) -> String {
        format!("{}/{}", self.base(), self.quote())
    }
}

fn currency_code(s: &str) -> Option<[u8; 3]> {
    let bytes = s.as_bytes();
    if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_uppercase) {
        return None;
    }
    Some([bytes[0], bytes[1], bytes[2]])
}

impl fmt::Display for FxPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.base(), self.quote())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFxRow {
    pub pair: Option<String>,
    pub date: Option<String>,
    pub rate: Option<String>,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FxRate {
    pub pair: FxPair,
    pub date: NaiveDate,
    pub rate: f64,
    pub source: String,
}

impl FxRate {
    pub fn to_sql_row(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.pair.to_string()),
            SqlValue::Date(self.date),
            SqlValue::Real(self.rate),
            SqlValue::Text(self.source.clone()),
        ]
    }

    pub fn to_raw(&self) -> RawFxRow {
        RawFxRow {
            pair: Some(self.pair.to_string()),
            date: Some(super::bar::format_date(self.date)),
            rate: Some(self.rate.to_string()),
            source: self.source.clone(),
        }
    }
}

pub fn fx_batch(rates: &[FxRate]) -> RowBatch {
    RowBatch {
        columns: FX_COLUMNS.iter().map(|c| c.to_string()).collect(),
        rows: rates.iter().map(FxRate::to_sql_row).collect(),
    }
}

/// Parse a comma-separated pair list from configuration.
pub fn parse_pairs(input: &str) -> Result<Vec<FxPair>, String> {
    let mut pairs = Vec::new();
    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            continue;
        }
        let pair = FxPair::parse(trimmed).ok_or_else(|| format!("invalid FX pair '{trimmed}'"))?;
        if !pairs.contains(&pair) {
            pairs.push(pair);
        }
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concatenated_and_slashed_forms_are_equal() {
        let a = FxPair::parse("USDGBP").unwrap();
        let b = FxPair::parse("USD/GBP").unwrap();
        let c = FxPair::parse(" usd/gbp ").unwrap();
        let d = FxPair::parse("usdgbp").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a, d);
    }

    #[test]
    fn renders_both_directions() {
        let pair = FxPair::parse("EUR/USD").unwrap();
        assert_eq!(pair.to_string(), "EURUSD");
        assert_eq!(pair.slashed(), "EUR/USD");
        assert_eq!(FxPair::parse(&pair.slashed()), Some(pair));
        assert_eq!(FxPair::parse(&pair.to_string()), Some(pair));
    }

    #[test]
    fn base_and_quote() {
        let pair = FxPair::parse("gbpusd").unwrap();
        assert_eq!(pair.base(), "GBP");
        assert_eq!(pair.quote(), "USD");
    }

    #[test]
    fn rejects_malformed_pairs() {
        assert_eq!(FxPair::parse(""), None);
        assert_eq!(FxPair::parse("USDGB"), None);
        assert_eq!(FxPair::parse("USDGBPX"), None);
        assert_eq!(FxPair::parse("US1GBP"), None);
        assert_eq!(FxPair::parse("USD/GB"), None);
        assert_eq!(FxPair::parse("USD/GBP/EUR"), None);
    }

    #[test]
    fn parse_pairs_dedups_and_skips_blanks() {
        let pairs = parse_pairs("USDGBP, USD/GBP,,eurusd").unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].to_string(), "USDGBP");
        assert_eq!(pairs[1].to_string(), "EURUSD");
    }

    #[test]
    fn parse_pairs_reports_bad_token() {
        let err = parse_pairs("USDGBP,XX").unwrap_err();
        assert!(err.contains("XX"));
    }

    #[test]
    fn sql_row_uses_canonical_pair() {
        let rate = FxRate {
            pair: FxPair::parse("USD/GBP").unwrap(),
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            rate: 0.7865,
            source: "ecb".into(),
        };
        let row = rate.to_sql_row();
        assert_eq!(row[0], SqlValue::Text("USDGBP".into()));
        assert_eq!(row[2], SqlValue::Real(0.7865));
    }
}
