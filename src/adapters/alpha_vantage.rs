//! Alpha Vantage equity and FX source.
//!
//! The API answers rate limiting with a 200 whose JSON body carries a `Note`,
//! `Information` or `Error Message` key (or is an empty object). Those are
//! retried like any transient failure. A 200 without the expected series key
//! is a schema mismatch.

use crate::domain::bar::{RawEquityRow, parse_date};
use crate::domain::error::EtlError;
use crate::domain::fx::{FxPair, RawFxRow};
use crate::domain::retry::{Outcome, RetryPolicy, fetch_with_retry};
use crate::ports::http_port::{HttpPort, HttpRequest, HttpResponse};
use crate::ports::source_port::{EquitySource, FxSource};
use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;

pub const SOURCE: &str = "alphavantage";
const EQUITY_SERIES: &str = "Time Series (Daily)";
const FX_SERIES: &str = "Time Series FX (Daily)";
const PROVIDER_MESSAGES: [&str; 3] = ["Note", "Information", "Error Message"];

pub struct AlphaVantage {
    http: Arc<dyn HttpPort>,
    policy: RetryPolicy,
    base_url: String,
    api_key: String,
    benchmark: String,
}

impl AlphaVantage {
    pub fn new(
        http: Arc<dyn HttpPort>,
        policy: RetryPolicy,
        base_url: &str,
        api_key: &str,
        benchmark: &str,
    ) -> Self {
        Self {
            http,
            policy,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            benchmark: benchmark.to_uppercase(),
        }
    }

    fn fetch_series_map(&self, request: &HttpRequest, series_key: &str) -> Result<Map<String, Value>, EtlError> {
        fetch_with_retry(self.http.as_ref(), &self.policy, SOURCE, request, |resp| {
            classify(resp, series_key)
        })
    }

    fn fetch_symbol(&self, symbol: &str, start_date: NaiveDate) -> Result<Vec<RawEquityRow>, EtlError> {
        let symbol = symbol.to_uppercase();
        let request = HttpRequest::get(&self.base_url)
            .query("function", "TIME_SERIES_DAILY_ADJUSTED")
            .query("symbol", symbol.as_str())
            .query("outputsize", "full")
            .query("apikey", self.api_key.as_str());
        let series = self.fetch_series_map(&request, EQUITY_SERIES)?;
        let benchmark = symbol == self.benchmark;

        let mut rows = Vec::with_capacity(series.len());
        for (date, values) in &series {
            if !on_or_after(date, start_date) {
                continue;
            }
            let field = |key: &str| values.get(key).and_then(json_text);
            let row = if benchmark {
                RawEquityRow {
                    symbol: Some(symbol.clone()),
                    date: Some(date.clone()),
                    close: field("4. close"),
                    source: SOURCE.to_string(),
                    ..RawEquityRow::default()
                }
            } else {
                RawEquityRow {
                    symbol: Some(symbol.clone()),
                    date: Some(date.clone()),
                    open: field("1. open"),
                    high: field("2. high"),
                    low: field("3. low"),
                    close: field("4. close"),
                    volume: field("6. volume").or_else(|| field("5. volume")),
                    source: SOURCE.to_string(),
                }
            };
            rows.push(row);
        }
        info!(source = SOURCE, %symbol, rows = rows.len(), "fetched daily series");
        Ok(rows)
    }

    fn fetch_pair(&self, pair: FxPair, start_date: NaiveDate) -> Result<Vec<RawFxRow>, EtlError> {
        let request = HttpRequest::get(&self.base_url)
            .query("function", "FX_DAILY")
            .query("from_symbol", pair.base())
            .query("to_symbol", pair.quote())
            .query("outputsize", "full")
            .query("apikey", self.api_key.as_str());
        let series = self.fetch_series_map(&request, FX_SERIES)?;

        let rows: Vec<RawFxRow> = series
            .iter()
            .filter(|(date, _)| on_or_after(date, start_date))
            .map(|(date, values)| RawFxRow {
                pair: Some(pair.to_string()),
                date: Some(date.clone()),
                rate: values.get("4. close").and_then(json_text),
                source: SOURCE.to_string(),
            })
            .collect();
        info!(source = SOURCE, %pair, rows = rows.len(), "fetched fx series");
        Ok(rows)
    }
}

impl EquitySource for AlphaVantage {
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

impl FxSource for AlphaVantage {
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

fn classify(resp: &HttpResponse, series_key: &str) -> Outcome<Map<String, Value>> {
    let data: Value = match serde_json::from_str(&resp.body) {
        Ok(v) => v,
        Err(e) => return Outcome::Fatal(EtlError::schema(SOURCE, format!("invalid JSON: {e}"))),
    };
    let Some(object) = data.as_object() else {
        return Outcome::Fatal(EtlError::schema(SOURCE, "response is not a JSON object"));
    };
    if object.is_empty() {
        return Outcome::Retry("empty JSON object".into());
    }
    if let Some(message) = PROVIDER_MESSAGES
        .iter()
        .find_map(|key| object.get(*key).map(|v| format!("{key}: {}", json_text(v).unwrap_or_default())))
    {
        return Outcome::Retry(message);
    }
    match object.get(series_key).and_then(Value::as_object) {
        Some(series) => Outcome::Ready(series.clone()),
        None => Outcome::Fatal(EtlError::schema(
            SOURCE,
            format!("missing '{series_key}' in response"),
        )),
    }
}

fn json_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn on_or_after(date: &str, start_date: NaiveDate) -> bool {
    parse_date(date).is_some_and(|d| d >= start_date)
}
