//! Stooq delayed-quote CSV source.
//!
//! Stooq reports its daily quota as a 200 whose body reads "Exceeded the
//! daily hits limit". That reply is retried like any transient failure.

use crate::domain::bar::{RawEquityRow, parse_date};
use crate::domain::error::EtlError;
use crate::domain::fx::{FxPair, RawFxRow};
use crate::domain::retry::{Outcome, RetryPolicy, fetch_with_retry};
use crate::ports::http_port::{HttpPort, HttpRequest, HttpResponse};
use crate::ports::source_port::{EquitySource, FxSource};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

pub const SOURCE: &str = "stooq";
const HITS_LIMIT: &str = "exceeded the daily hits limit";

pub struct Stooq {
    http: Arc<dyn HttpPort>,
    policy: RetryPolicy,
    base_url: String,
}

/// One parsed CSV row keyed by lower-cased header.
type CsvRow = HashMap<String, String>;

impl Stooq {
    pub fn new(http: Arc<dyn HttpPort>, policy: RetryPolicy, base_url: &str) -> Self {
        Self {
            http,
            policy,
            base_url: base_url.to_string(),
        }
    }

    /// Download `?s=<ticker>&i=d`. `None` when Stooq has no data for it.
    fn download(&self, ticker: &str) -> Result<Option<Vec<CsvRow>>, EtlError> {
        let request = HttpRequest::get(&self.base_url)
            .query("s", ticker)
            .query("i", "d");
        let body = fetch_with_retry(self.http.as_ref(), &self.policy, SOURCE, &request, classify)?;
        if body.trim().eq_ignore_ascii_case("no data") {
            info!(source = SOURCE, ticker, "no data");
            return Ok(None);
        }
        parse_csv(&body).map(Some)
    }

    fn fetch_symbol(&self, symbol: &str, start_date: NaiveDate) -> Result<Vec<RawEquityRow>, EtlError> {
        let Some(records) = self.download(&stooq_ticker(symbol))? else {
            return Ok(Vec::new());
        };
        require_columns(&records, &["date", "close"])?;

        let symbol = symbol.trim().to_uppercase();
        let rows: Vec<RawEquityRow> = records
            .into_iter()
            .filter(|r| on_or_after(r, start_date))
            .map(|mut r| RawEquityRow {
                symbol: Some(symbol.clone()),
                date: r.remove("date"),
                open: r.remove("open"),
                high: r.remove("high"),
                low: r.remove("low"),
                close: r.remove("close"),
                volume: r.remove("volume"),
                source: SOURCE.to_string(),
            })
            .collect();
        info!(source = SOURCE, %symbol, rows = rows.len(), "fetched daily series");
        Ok(rows)
    }

    fn fetch_pair(&self, pair: FxPair, start_date: NaiveDate) -> Result<Vec<RawFxRow>, EtlError> {
        let Some(records) = self.download(&pair.to_string().to_lowercase())? else {
            return Ok(Vec::new());
        };
        require_columns(&records, &["date", "close"])?;

        let rows: Vec<RawFxRow> = records
            .into_iter()
            .filter(|r| on_or_after(r, start_date))
            .map(|mut r| RawFxRow {
                pair: Some(pair.to_string()),
                date: r.remove("date"),
                rate: r.remove("close"),
                source: SOURCE.to_string(),
            })
            .collect();
        info!(source = SOURCE, %pair, rows = rows.len(), "fetched fx series");
        Ok(rows)
    }
}

impl EquitySource for Stooq {
    fn name(&self) -> &str {
        SOURCE
    }

    fn fetch_series(&self, symbols: &[String], start_date: NaiveDate) -> Result<Vec<RawEquityRow>, EtlError> {
        let mut rows = Vec::new();
        for symbol in symbols {
            rows.extend(self.fetch_symbol(symbol, start_date)?);
        }
        Ok(rows)
    }
}

impl FxSource for Stooq {
    fn name(&self) -> &str {
        SOURCE
    }

    fn fetch_rates(&self, pairs: &[FxPair], start_date: NaiveDate) -> Result<Vec<RawFxRow>, EtlError> {
        let mut rows = Vec::new();
        for pair in pairs {
            rows.extend(self.fetch_pair(*pair, start_date)?);
        }
        Ok(rows)
    }
}

fn classify(resp: &HttpResponse) -> Outcome<String> {
    if resp.body.to_lowercase().contains(HITS_LIMIT) {
        Outcome::Retry(format!("rate limited: {}", resp.body.trim()))
    } else {
        Outcome::Ready(resp.body.clone())
    }
}

/// US listings are addressed as `<symbol>.us`.
fn stooq_ticker(symbol: &str) -> String {
    let s = symbol.trim().to_lowercase();
    if s.ends_with(".us") { s } else { format!("{s}.us") }
}

fn parse_csv(body: &str) -> Result<Vec<CsvRow>, EtlError> {
    let mut rdr = csv::Reader::from_reader(body.as_bytes());
    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| EtlError::schema(SOURCE, format!("CSV header error: {e}")))?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(|e| EtlError::schema(SOURCE, format!("CSV parse error: {e}")))?;
        let row: CsvRow = headers
            .iter()
            .cloned()
            .zip(record.iter().map(|v| v.trim().to_string()))
            .collect();
        rows.push(row);
    }
    if rows.is_empty() && !headers.iter().any(|h| h == "date") {
        return Err(EtlError::schema(SOURCE, format!("unexpected payload: {}", headers.join(","))));
    }
    Ok(rows)
}

fn require_columns(rows: &[CsvRow], columns: &[&str]) -> Result<(), EtlError> {
    let Some(first) = rows.first() else {
        return Ok(());
    };
    let missing: Vec<&str> = columns
        .iter()
        .copied()
        .filter(|c| !first.contains_key(*c))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(EtlError::schema(SOURCE, format!("missing columns: {}", missing.join(", "))))
    }
}

fn on_or_after(row: &CsvRow, start_date: NaiveDate) -> bool {
    row.get("date")
        .and_then(|d| parse_date(d))
        .is_some_and(|d| d >= start_date)
}
