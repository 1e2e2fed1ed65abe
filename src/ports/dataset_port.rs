//! Local processed-data storage port trait.

use crate::domain::bar::EquityBar;
use crate::domain::error::EtlError;
use crate::domain::fx::FxRate;
use crate::ports::warehouse_port::QueryResult;
use std::path::PathBuf;

pub trait DatasetPort {
    /// Write one snapshot file `<name>.parquet`, replacing any previous one.
    fn write_equities(&self, name: &str, bars: &[EquityBar]) -> Result<PathBuf, EtlError>;

    fn write_fx(&self, name: &str, rates: &[FxRate]) -> Result<PathBuf, EtlError>;

    /// Write one file per (symbol, date) leaf under `<name>/`. Returns the
    /// number of partition files written.
    fn write_equities_partitioned(&self, name: &str, bars: &[EquityBar])
    -> Result<usize, EtlError>;

    /// Write one file per (pair, date) leaf under `<name>/`.
    fn write_fx_partitioned(&self, name: &str, rates: &[FxRate]) -> Result<usize, EtlError>;

    fn read_equities(&self, name: &str) -> Result<Vec<EquityBar>, EtlError>;

    fn read_fx(&self, name: &str) -> Result<Vec<FxRate>, EtlError>;

    /// Write an arbitrary query result to `snapshots/<name>.parquet`.
    fn write_snapshot(&self, name: &str, result: &QueryResult) -> Result<PathBuf, EtlError>;
}
