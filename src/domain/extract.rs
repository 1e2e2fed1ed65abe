//! Multi-source extraction with ordered fallback, and watermark filtering.

use super::bar::EquityBar;
use super::error::EtlError;
use super::fx::{FxPair, FxRate, RawFxRow};
use crate::domain::bar::RawEquityRow;
use crate::ports::source_port::{EquitySource, FxSource};
use chrono::NaiveDate;
use tracing::{info, warn};

/// Tries each equity source in order. Only `SourceUnavailable` moves on to the
/// next source; any other error aborts the extraction.
pub struct FallbackEquitySource {
    sources: Vec<Box<dyn EquitySource>>,
}

impl FallbackEquitySource {
    pub fn new(sources: Vec<Box<dyn EquitySource>>) -> Self {
        Self { sources }
    }
}

impl EquitySource for FallbackEquitySource {
    fn name(&self) -> &str {
        "fallback"
    }

    fn fetch_series(
        &self,
        symbols: &[String],
        start_date: NaiveDate,
    ) -> Result<Vec<RawEquityRow>, EtlError> {
        let mut last_err = None;
        for source in &self.sources {
            match source.fetch_series(symbols, start_date) {
                Ok(rows) => {
                    info!(source = source.name(), rows = rows.len(), "equities fetched");
                    return Ok(rows);
                }
                Err(e @ EtlError::SourceUnavailable { .. }) => {
                    warn!(source = source.name(), "falling back: {e}");
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| EtlError::SourceUnavailable {
            source_name: "equities".into(),
            attempts: 0,
            reason: "no equity sources configured".into(),
        }))
    }
}

/// Same policy as [`FallbackEquitySource`] for FX sources.
pub struct FallbackFxSource {
    sources: Vec<Box<dyn FxSource>>,
}

impl FallbackFxSource {
    pub fn new(sources: Vec<Box<dyn FxSource>>) -> Self {
        Self { sources }
    }
}

impl FxSource for FallbackFxSource {
    fn name(&self) -> &str {
        "fallback"
    }

    fn fetch_rates(
        &self,
        pairs: &[FxPair],
        start_date: NaiveDate,
    ) -> Result<Vec<RawFxRow>, EtlError> {
        let mut last_err = None;
        for source in &self.sources {
            match source.fetch_rates(pairs, start_date) {
                Ok(rows) => {
                    info!(source = source.name(), rows = rows.len(), "fx fetched");
                    return Ok(rows);
                }
                Err(e @ EtlError::SourceUnavailable { .. }) => {
                    warn!(source = source.name(), "falling back: {e}");
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| EtlError::SourceUnavailable {
            source_name: "fx".into(),
            attempts: 0,
            reason: "no fx sources configured".into(),
        }))
    }
}

/// Keep only bars strictly after the watermark. No watermark keeps everything.
pub fn equities_after(bars: Vec<EquityBar>, watermark: Option<NaiveDate>) -> Vec<EquityBar> {
    match watermark {
        Some(mark) => bars.into_iter().filter(|b| b.date > mark).collect(),
        None => bars,
    }
}

pub fn fx_after(rates: Vec<FxRate>, watermark: Option<NaiveDate>) -> Vec<FxRate> {
    match watermark {
        Some(mark) => rates.into_iter().filter(|r| r.date > mark).collect(),
        None => rates,
    }
}
