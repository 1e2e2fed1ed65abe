//! Persistent load watermarks.
//!
//! One row per logical source in `LOAD_METADATA`. A watermark only moves
//! forward: [`WatermarkStore::set_last_loaded`] takes the max of the stored
//! and candidate dates, and the upsert itself refuses to lower the stored
//! value. Callers must only advance a watermark after the corresponding data
//! write has committed.

use super::error::EtlError;
use crate::ports::warehouse_port::{SqlValue, WarehousePort};
use chrono::NaiveDate;
use tracing::info;

pub const EQUITIES: &str = "equities";
pub const FX: &str = "fx";

#[derive(Debug, Clone, PartialEq)]
pub struct Watermark {
    pub source_name: String,
    pub last_loaded_date: NaiveDate,
    pub updated_at: Option<String>,
}

const UPSERT_SQL: &str = "INSERT INTO LOAD_METADATA (SOURCE, LAST_LOADED_DATE, UPDATED_AT) \
     VALUES ($1, $2, CURRENT_TIMESTAMP) \
     ON CONFLICT (SOURCE) DO UPDATE SET \
       LAST_LOADED_DATE = excluded.LAST_LOADED_DATE, \
       UPDATED_AT = excluded.UPDATED_AT \
     WHERE excluded.LAST_LOADED_DATE > LOAD_METADATA.LAST_LOADED_DATE";

pub struct WatermarkStore<'a> {
    warehouse: &'a dyn WarehousePort,
}

impl<'a> WatermarkStore<'a> {
    pub fn new(warehouse: &'a dyn WarehousePort) -> Self {
        Self { warehouse }
    }

    pub fn get_last_loaded(&self, source: &str) -> Result<Option<NaiveDate>, EtlError> {
        let value = self.warehouse.query_scalar(
            "SELECT LAST_LOADED_DATE FROM LOAD_METADATA WHERE SOURCE = $1",
            &[SqlValue::from(source)],
        )?;
        Ok(value.and_then(|v| v.as_date()))
    }

    /// Record `date` as loaded for `source`, never moving the watermark back.
    /// Returns the watermark in effect afterwards.
    pub fn set_last_loaded(&self, source: &str, date: NaiveDate) -> Result<NaiveDate, EtlError> {
        let existing = self.get_last_loaded(source)?;
        let target = next_watermark(existing, date);
        if existing == Some(target) {
            return Ok(target);
        }
        self.warehouse
            .execute(UPSERT_SQL, &[SqlValue::from(source), SqlValue::Date(target)])?;
        info!(source, from = ?existing, to = %target, "watermark advanced");
        Ok(target)
    }

    pub fn list(&self) -> Result<Vec<Watermark>, EtlError> {
        let result = self.warehouse.query_rows(
            "SELECT SOURCE, LAST_LOADED_DATE, UPDATED_AT FROM LOAD_METADATA ORDER BY SOURCE",
            &[],
        )?;
        Ok(result
            .rows
            .iter()
            .filter_map(|row| {
                Some(Watermark {
                    source_name: row.first()?.as_text()?,
                    last_loaded_date: row.get(1)?.as_date()?,
                    updated_at: row.get(2).and_then(SqlValue::as_text),
                })
            })
            .collect())
    }
}

/// The watermark after loading data through `candidate`.
pub fn next_watermark(existing: Option<NaiveDate>, candidate: NaiveDate) -> NaiveDate {
    existing.map_or(candidate, |current| current.max(candidate))
}
