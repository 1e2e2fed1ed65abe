//! Pipeline orchestration.
//!
//! The daily run is linear: watermark read, extract, clean, filter to new
//! rows, local write, warehouse append, watermark advance, quality gate,
//! transforms, export, upload. Each step only starts once the previous one
//! has succeeded; in particular a watermark is only advanced after its data
//! has been written and transforms only run once the gate has passed.

use super::bar::EquityBar;
use super::cleaning::{clean_equities, clean_fx};
use super::config::PipelineConfig;
use super::error::EtlError;
use super::export::{ExportReport, export_portfolio_metrics, upload_snapshot};
use super::extract::{equities_after, fx_after};
use super::fx::FxRate;
use super::loader::{AppendLoader, LoadReport, MergeLoader, MergeReport};
use super::profile::{profile_equities, profile_fx};
use super::quality::{QualityCheckResult, QualityGate, default_checks};
use super::transaction::read_transactions;
use super::transforms::run_transforms;
use super::watermark::{self, WatermarkStore};
use crate::ports::dataset_port::DatasetPort;
use crate::ports::notifier_port::NotifierPort;
use crate::ports::object_store_port::ObjectStorePort;
use crate::ports::source_port::{EquitySource, FxSource};
use crate::ports::warehouse_port::WarehousePort;
use chrono::NaiveDate;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const EQUITY_DATASET: &str = "equity_daily";
pub const FX_DATASET: &str = "fx_daily";

/// Outcome of one dataset's incremental step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepReport {
    pub rows_loaded: usize,
    /// Watermark after the step, `None` if nothing has ever been loaded.
    pub watermark: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IncrementalReport {
    pub equities: StepReport,
    pub fx: StepReport,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyReport {
    pub incremental: IncrementalReport,
    pub checks: Vec<QualityCheckResult>,
    pub export: ExportReport,
    pub uploaded_key: Option<String>,
}

pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
    equities: &'a dyn EquitySource,
    fx: &'a dyn FxSource,
    warehouse: &'a dyn WarehousePort,
    datasets: &'a dyn DatasetPort,
    notifier: &'a dyn NotifierPort,
    object_store: Option<&'a dyn ObjectStorePort>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        equities: &'a dyn EquitySource,
        fx: &'a dyn FxSource,
        warehouse: &'a dyn WarehousePort,
        datasets: &'a dyn DatasetPort,
        notifier: &'a dyn NotifierPort,
    ) -> Self {
        Self {
            config,
            equities,
            fx,
            warehouse,
            datasets,
            notifier,
            object_store: None,
        }
    }

    pub fn with_object_store(mut self, store: &'a dyn ObjectStorePort) -> Self {
        self.object_store = Some(store);
        self
    }

    /// Load everything newer than the stored watermarks.
    pub fn run_incremental(&self) -> Result<IncrementalReport, EtlError> {
        let store = WatermarkStore::new(self.warehouse);
        let loader = AppendLoader::new(self.warehouse);

        let last_eq = store.get_last_loaded(watermark::EQUITIES)?;
        info!(last_loaded = ?last_eq, "last equities load date");
        let raw = self
            .equities
            .fetch_series(&self.config.all_symbols(), self.config.start_date)?;
        let bars = equities_after(clean_equities(&raw), last_eq);
        let equities = if bars.is_empty() {
            info!("No new equities to load.");
            StepReport {
                rows_loaded: 0,
                watermark: last_eq,
            }
        } else {
            self.write_local_equities(&bars)?;
            let report = loader.load_equities(&bars)?;
            let through = max_date(bars.iter().map(|b| b.date));
            let watermark = match through {
                Some(date) => Some(store.set_last_loaded(watermark::EQUITIES, date)?),
                None => last_eq,
            };
            info!(rows = report.rows_written, through = ?watermark, "equities loaded");
            StepReport {
                rows_loaded: report.rows_written,
                watermark,
            }
        };

        let last_fx = store.get_last_loaded(watermark::FX)?;
        info!(last_loaded = ?last_fx, "last FX load date");
        let raw = self
            .fx
            .fetch_rates(&self.config.fx_pairs, self.config.start_date)?;
        let rates = fx_after(clean_fx(&raw), last_fx);
        let fx = if rates.is_empty() {
            info!("No new FX data to load.");
            StepReport {
                rows_loaded: 0,
                watermark: last_fx,
            }
        } else {
            self.write_local_fx(&rates)?;
            let report = loader.load_fx(&rates)?;
            let through = max_date(rates.iter().map(|r| r.date));
            let watermark = match through {
                Some(date) => Some(store.set_last_loaded(watermark::FX, date)?),
                None => last_fx,
            };
            info!(rows = report.rows_written, through = ?watermark, "FX loaded");
            StepReport {
                rows_loaded: report.rows_written,
                watermark,
            }
        };

        Ok(IncrementalReport { equities, fx })
    }

    pub fn run_quality(&self, run_date: NaiveDate) -> Result<Vec<QualityCheckResult>, EtlError> {
        let quality = &self.config.quality;
        let gate = QualityGate::new(self.warehouse, self.notifier, quality.mode);
        gate.run(
            run_date,
            &default_checks(quality.fx_join_pair, run_date, quality.require_today),
        )
    }

    pub fn run_transforms(&self) -> Result<usize, EtlError> {
        run_transforms(
            self.warehouse,
            self.config.quality.fx_join_pair,
            &self.config.benchmark,
        )
    }

    pub fn export(&self, run_date: NaiveDate) -> Result<ExportReport, EtlError> {
        export_portfolio_metrics(
            self.warehouse,
            self.datasets,
            run_date,
            self.config.snapshot_days,
        )
    }

    /// Upload `snapshot`, or skip with a log line when no store is configured.
    pub fn upload(&self, snapshot: &Path) -> Result<Option<String>, EtlError> {
        match self.object_store {
            Some(store) => upload_snapshot(store, snapshot, &self.config.object_store.prefix).map(Some),
            None => {
                info!("no object store configured, skipping upload");
                Ok(None)
            }
        }
    }

    /// The full daily run. A quality failure stops the run before transforms.
    pub fn run_daily(&self, run_date: NaiveDate, skip_upload: bool) -> Result<DailyReport, EtlError> {
        info!(%run_date, "starting daily run");
        let incremental = self.run_incremental()?;
        let checks = self.run_quality(run_date)?;
        self.run_transforms()?;
        let export = self.export(run_date)?;
        let uploaded_key = if skip_upload {
            info!("upload skipped");
            None
        } else {
            self.upload(&export.path)?
        };
        info!(%run_date, "daily run completed");
        Ok(DailyReport {
            incremental,
            checks,
            export,
            uploaded_key,
        })
    }

    /// Fetch full history into single local snapshot files and log a profile
    /// of each dataset.
    pub fn run_local_extract(&self) -> Result<(PathBuf, PathBuf), EtlError> {
        info!(symbols = ?self.config.all_symbols(), start = %self.config.start_date, "fetching equities");
        let raw = self
            .equities
            .fetch_series(&self.config.all_symbols(), self.config.start_date)?;
        let bars = clean_equities(&raw);
        let eq_path = self.datasets.write_equities(EQUITY_DATASET, &bars)?;

        info!(pairs = self.config.fx_pairs.len(), "fetching fx");
        let raw = self
            .fx
            .fetch_rates(&self.config.fx_pairs, self.config.start_date)?;
        let rates = clean_fx(&raw);
        let fx_path = self.datasets.write_fx(FX_DATASET, &rates)?;

        info!("DQ equities: {}", profile_equities(EQUITY_DATASET, &bars).to_json());
        info!("DQ fx: {}", profile_fx(FX_DATASET, &rates).to_json());
        info!(equities = %eq_path.display(), fx = %fx_path.display(), "parquet written");
        Ok((eq_path, fx_path))
    }

    /// Append the local snapshot files produced by [`Pipeline::run_local_extract`].
    pub fn load_raw(&self) -> Result<(LoadReport, LoadReport), EtlError> {
        let loader = AppendLoader::new(self.warehouse);
        let bars = self.datasets.read_equities(EQUITY_DATASET)?;
        info!(rows = bars.len(), "loading equities -> EQUITY_DAILY");
        let eq = loader.load_equities(&bars)?;
        let rates = self.datasets.read_fx(FX_DATASET)?;
        info!(rows = rates.len(), "loading FX -> FX_DAILY");
        let fx = loader.load_fx(&rates)?;
        Ok((eq, fx))
    }

    pub fn load_transactions(&self, csv_path: &Path) -> Result<MergeReport, EtlError> {
        let file = File::open(csv_path)?;
        let transactions = read_transactions(file)?;
        info!(rows = transactions.len(), file = %csv_path.display(), "read transactions");
        MergeLoader::new(self.warehouse).load_transactions(&transactions)
    }

    fn write_local_equities(&self, bars: &[EquityBar]) -> Result<(), EtlError> {
        if self.config.partitioned {
            let files = self.datasets.write_equities_partitioned(EQUITY_DATASET, bars)?;
            info!(files, "wrote partitioned equities");
        } else {
            self.datasets.write_equities(EQUITY_DATASET, bars)?;
        }
        Ok(())
    }

    fn write_local_fx(&self, rates: &[FxRate]) -> Result<(), EtlError> {
        if self.config.partitioned {
            let files = self.datasets.write_fx_partitioned(FX_DATASET, rates)?;
            info!(files, "wrote partitioned fx");
        } else {
            self.datasets.write_fx(FX_DATASET, rates)?;
        }
        Ok(())
    }
}

fn max_date(dates: impl Iterator<Item = NaiveDate>) -> Option<NaiveDate> {
    dates.max()
}

/// Alert once on a failed job. Data-quality failures have already alerted
/// from the gate and are passed through untouched.
pub fn alert_on_failure<T>(
    notifier: &dyn NotifierPort,
    job: &str,
    result: Result<T, EtlError>,
) -> Result<T, EtlError> {
    if let Err(e) = &result {
        error!(job, error = %e, "job failed");
        if !e.is_data_quality() {
            notifier.notify(&format!("portfolio-etl {job} failed: {e}"));
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        messages: RefCell<Vec<String>>,
    }

    impl NotifierPort for Recorder {
        fn notify(&self, message: &str) {
            self.messages.borrow_mut().push(message.to_string());
        }
    }

    #[test]
    fn max_date_of_empty_is_none() {
        assert_eq!(max_date(std::iter::empty()), None);
    }

    #[test]
    fn failure_alerts_once() {
        let notifier = Recorder::default();
        let result: Result<(), EtlError> = Err(EtlError::persistence("disk full"));
        assert!(alert_on_failure(&notifier, "incremental", result).is_err());
        let messages = notifier.messages.borrow();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("incremental"));
        assert!(messages[0].contains("disk full"));
    }

    #[test]
    fn quality_failure_not_alerted_twice() {
        let notifier = Recorder::default();
        let result: Result<(), EtlError> = Err(EtlError::DataQualityFailure {
            failed: vec!["fx_today_present".into()],
            message: "already alerted".into(),
        });
        assert!(alert_on_failure(&notifier, "incremental", result).is_err());
        assert!(notifier.messages.borrow().is_empty());
    }

    #[test]
    fn success_is_silent() {
        let notifier = Recorder::default();
        assert_eq!(alert_on_failure(&notifier, "status", Ok(3)).unwrap(), 3);
        assert!(notifier.messages.borrow().is_empty());
    }
}
