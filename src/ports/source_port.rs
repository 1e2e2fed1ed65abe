//! Upstream data source port traits.
//!
//! Sources always return everything they have from `start_date` onward;
//! filtering against the watermark is the caller's job.

use crate::domain::bar::RawEquityRow;
use crate::domain::error::EtlError;
use crate::domain::fx::{FxPair, RawFxRow};
use chrono::NaiveDate;

pub trait EquitySource {
    fn name(&self) -> &str;

    fn fetch_series(
        &self,
        symbols: &[String],
        start_date: NaiveDate,
    ) -> Result<Vec<RawEquityRow>, EtlError>;
}

pub trait FxSource {
    fn name(&self) -> &str;

    /// Rows come back with pairs already in the canonical concatenated form.
    fn fetch_rates(
        &self,
        pairs: &[FxPair],
        start_date: NaiveDate,
    ) -> Result<Vec<RawFxRow>, EtlError>;
}
