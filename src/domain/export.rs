//! Snapshot export and upload.

use super::error::EtlError;
use super::transforms::VIEW_PORTFOLIO_METRICS;
use crate::ports::dataset_port::DatasetPort;
use crate::ports::object_store_port::ObjectStorePort;
use crate::ports::warehouse_port::{SqlValue, WarehousePort};
use chrono::{Duration, NaiveDate};
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

pub const SNAPSHOT_NAME: &str = "portfolio_metrics";

#[derive(Debug, Clone, PartialEq)]
pub struct ExportReport {
    pub path: PathBuf,
    pub rows: usize,
}

/// Write the last `snapshot_days` days of portfolio metrics (up to and
/// including `run_date`) to `snapshots/portfolio_metrics.parquet`.
pub fn export_portfolio_metrics(
    warehouse: &dyn WarehousePort,
    datasets: &dyn DatasetPort,
    run_date: NaiveDate,
    snapshot_days: u32,
) -> Result<ExportReport, EtlError> {
    let cutoff = run_date - Duration::days(i64::from(snapshot_days));
    let result = warehouse.query_rows(
        &format!("SELECT * FROM {VIEW_PORTFOLIO_METRICS} WHERE DATE >= $1 ORDER BY PORTFOLIO_ID, DATE"),
        &[SqlValue::Date(cutoff)],
    )?;
    let path = datasets.write_snapshot(SNAPSHOT_NAME, &result)?;
    info!(rows = result.rows.len(), path = %path.display(), %cutoff, "exported snapshot");
    Ok(ExportReport {
        rows: result.rows.len(),
        path,
    })
}

/// Remote key for the snapshot file under `prefix`.
pub fn snapshot_key(prefix: &str, local_file: &Path) -> String {
    let name = local_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("{SNAPSHOT_NAME}.parquet"));
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        name
    } else {
        format!("{prefix}/{name}")
    }
}

/// Upload a previously exported snapshot. A missing file is an I/O error.
pub fn upload_snapshot(
    store: &dyn ObjectStorePort,
    local_file: &Path,
    prefix: &str,
) -> Result<String, EtlError> {
    if !local_file.is_file() {
        return Err(EtlError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("snapshot file not found: {}", local_file.display()),
        )));
    }
    let key = snapshot_key(prefix, local_file);
    info!(file = %local_file.display(), %key, "uploading snapshot");
    store.upload(local_file, &key)?;
    info!(%key, "upload complete");
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingStore {
        keys: RefCell<Vec<String>>,
    }

    impl ObjectStorePort for RecordingStore {
        fn upload(&self, _local_file: &Path, remote_key: &str) -> Result<(), EtlError> {
            self.keys.borrow_mut().push(remote_key.to_string());
            Ok(())
        }
    }

    #[test]
    fn key_joins_prefix_and_file_name() {
        let file = Path::new("data/processed/snapshots/portfolio_metrics.parquet");
        assert_eq!(
            snapshot_key("snapshots/portfolio_metrics", file),
            "snapshots/portfolio_metrics/portfolio_metrics.parquet"
        );
        assert_eq!(
            snapshot_key("/snapshots/", file),
            "snapshots/portfolio_metrics.parquet"
        );
        assert_eq!(snapshot_key("", file), "portfolio_metrics.parquet");
    }

    #[test]
    fn missing_snapshot_is_io_error() {
        let store = RecordingStore::default();
        let err = upload_snapshot(&store, Path::new("/nonexistent/portfolio_metrics.parquet"), "p")
            .unwrap_err();
        assert!(matches!(err, EtlError::Io(_)));
        assert!(store.keys.borrow().is_empty());
    }

    #[test]
    fn existing_snapshot_is_uploaded_once() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("portfolio_metrics.parquet");
        std::fs::write(&file, b"PAR1").unwrap();
        let store = RecordingStore::default();

        let key = upload_snapshot(&store, &file, "snapshots/portfolio_metrics").unwrap();
        assert_eq!(key, "snapshots/portfolio_metrics/portfolio_metrics.parquet");
        assert_eq!(*store.keys.borrow(), vec![key]);
    }
}
