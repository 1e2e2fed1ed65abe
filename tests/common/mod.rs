#![allow(dead_code)]

use chrono::NaiveDate;
use portfolio_etl::adapters::file_config_adapter::FileConfigAdapter;
use portfolio_etl::domain::bar::RawEquityRow;
use portfolio_etl::domain::config::PipelineConfig;
use portfolio_etl::domain::error::EtlError;
use portfolio_etl::domain::fx::{FxPair, RawFxRow};
use portfolio_etl::ports::notifier_port::NotifierPort;
use portfolio_etl::ports::source_port::{EquitySource, FxSource};
use std::cell::{Cell, RefCell};
use std::path::Path;

pub fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

pub fn raw_bar(symbol: &str, date: &str, close: f64) -> RawEquityRow {
    RawEquityRow {
        symbol: Some(symbol.to_string()),
        date: Some(date.to_string()),
        open: Some(format!("{}", close - 1.0)),
        high: Some(format!("{}", close + 1.0)),
        low: Some(format!("{}", close - 2.0)),
        close: Some(close.to_string()),
        volume: Some("1000".into()),
        source: "mock".into(),
    }
}

pub fn raw_fx(pair: &str, date: &str, rate: f64) -> RawFxRow {
    RawFxRow {
        pair: Some(pair.to_string()),
        date: Some(date.to_string()),
        rate: Some(rate.to_string()),
        source: "mock".into(),
    }
}

/// AAPL and the SPY benchmark on every date, with a USDGBP rate per date.
pub fn market(dates: &[&str]) -> (Vec<RawEquityRow>, Vec<RawFxRow>) {
    let mut bars = Vec::new();
    let mut rates = Vec::new();
    for (i, date) in dates.iter().enumerate() {
        bars.push(raw_bar("AAPL", date, 185.0 + i as f64));
        bars.push(raw_bar("SPY", date, 470.0 + i as f64));
        rates.push(raw_fx("USDGBP", date, 0.78 + i as f64 / 1000.0));
    }
    (bars, rates)
}

/// Pipeline config rooted at `data_dir`, reading AAPL with SPY as benchmark
/// and USDGBP as the only pair. `extra` may add sections other than
/// `[pipeline]`, `[retry]` and `[sqlite]`.
pub fn test_config(data_dir: &Path, extra: &str) -> PipelineConfig {
    let ini = format!(
        "[pipeline]\n\
         symbols = AAPL\n\
         benchmark = SPY\n\
         start_date = 2024-01-01\n\
         data_dir = {}\n\
         equity_sources = stooq\n\
         fx_sources = ecb\n\
         fx_pairs = USDGBP\n\
         [retry]\n\
         max_attempts = 2\n\
         base_delay_ms = 0\n\
         [sqlite]\n\
         path = {}\n\
         {extra}\n",
        data_dir.display(),
        data_dir.join("warehouse.db").display(),
    );
    let adapter = FileConfigAdapter::from_string(&ini).unwrap();
    PipelineConfig::from_port(&adapter).unwrap()
}

/// Returns whatever rows it currently holds; can be switched to fail with
/// `SourceUnavailable` or `SchemaMismatch`.
pub struct MockEquitySource {
    pub name: String,
    pub rows: RefCell<Vec<RawEquityRow>>,
    pub failure: Cell<Option<Failure>>,
    pub calls: Cell<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Failure {
    Unavailable,
    Schema,
}

impl Failure {
    fn to_error(self, source: &str) -> EtlError {
        match self {
            Failure::Unavailable => EtlError::SourceUnavailable {
                source_name: source.to_string(),
                attempts: 5,
                reason: "HTTP 503".into(),
            },
            Failure::Schema => EtlError::schema(source, "missing 'Time Series (Daily)'"),
        }
    }
}

impl MockEquitySource {
    pub fn new(name: &str, rows: Vec<RawEquityRow>) -> Self {
        Self {
            name: name.to_string(),
            rows: RefCell::new(rows),
            failure: Cell::new(None),
            calls: Cell::new(0),
        }
    }

    pub fn failing(name: &str, failure: Failure) -> Self {
        let source = Self::new(name, Vec::new());
        source.failure.set(Some(failure));
        source
    }
}

impl EquitySource for MockEquitySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_series(&self, symbols: &[String], _start_date: NaiveDate) -> Result<Vec<RawEquityRow>, EtlError> {
        self.calls.set(self.calls.get() + 1);
        if let Some(failure) = self.failure.get() {
            return Err(failure.to_error(&self.name));
        }
        Ok(self
            .rows
            .borrow()
            .iter()
            .filter(|r| r.symbol.as_ref().is_some_and(|s| symbols.contains(s)))
            .cloned()
            .collect())
    }
}

pub struct MockFxSource {
    pub name: String,
    pub rows: RefCell<Vec<RawFxRow>>,
    pub failure: Cell<Option<Failure>>,
    pub calls: Cell<usize>,
}

impl MockFxSource {
    pub fn new(name: &str, rows: Vec<RawFxRow>) -> Self {
        Self {
            name: name.to_string(),
            rows: RefCell::new(rows),
            failure: Cell::new(None),
            calls: Cell::new(0),
        }
    }
}

impl FxSource for MockFxSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_rates(&self, pairs: &[FxPair], _start_date: NaiveDate) -> Result<Vec<RawFxRow>, EtlError> {
        self.calls.set(self.calls.get() + 1);
        if let Some(failure) = self.failure.get() {
            return Err(failure.to_error(&self.name));
        }
        let wanted: Vec<String> = pairs.iter().map(|p| p.to_string()).collect();
        Ok(self
            .rows
            .borrow()
            .iter()
            .filter(|r| r.pair.as_ref().is_some_and(|p| wanted.contains(p)))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: RefCell<Vec<String>>,
}

impl RecordingNotifier {
    pub fn count(&self) -> usize {
        self.messages.borrow().len()
    }
}

impl NotifierPort for RecordingNotifier {
    fn notify(&self, message: &str) {
        self.messages.borrow_mut().push(message.to_string());
    }
}
