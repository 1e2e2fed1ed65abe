//! Parquet dataset store.
//!
//! Layout under the processed-data root:
//! - `{root}/{name}.parquet` single snapshot files
//! - `{root}/{name}/SYMBOL={s}/DATE={d}/part-0.parquet` (or `PAIR=`) partitions
//! - `{root}/snapshots/{name}.parquet` exported query results
//!
//! Every file is written to `.tmp` and renamed into place.

use crate::domain::bar::{EQUITY_KEY, EquityBar, format_date, parse_date};
use crate::domain::error::EtlError;
use crate::domain::fx::{FX_KEY, FxPair, FxRate};
use crate::ports::dataset_port::DatasetPort;
use crate::ports::warehouse_port::{QueryResult, SqlValue};
use chrono::{Duration, NaiveDate};
use polars::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub struct ParquetStore {
    root: PathBuf,
}

impl ParquetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.parquet"))
    }

    fn partition_path(&self, name: &str, keys: [&str; 2], values: [&str; 2]) -> PathBuf {
        self.root
            .join(name)
            .join(format!("{}={}", keys[0], values[0]))
            .join(format!("{}={}", keys[1], values[1]))
            .join("part-0.parquet")
    }
}

impl DatasetPort for ParquetStore {
    fn write_equities(&self, name: &str, bars: &[EquityBar]) -> Result<PathBuf, EtlError> {
        let path = self.file_path(name);
        let mut df = equities_frame(bars)?;
        write_atomic(&mut df, &path)?;
        info!(rows = bars.len(), path = %path.display(), "wrote equities parquet");
        Ok(path)
    }

    fn write_fx(&self, name: &str, rates: &[FxRate]) -> Result<PathBuf, EtlError> {
        let path = self.file_path(name);
        let mut df = fx_frame(rates)?;
        write_atomic(&mut df, &path)?;
        info!(rows = rates.len(), path = %path.display(), "wrote fx parquet");
        Ok(path)
    }

    fn write_equities_partitioned(&self, name: &str, bars: &[EquityBar]) -> Result<usize, EtlError> {
        let mut groups: BTreeMap<(String, NaiveDate), Vec<EquityBar>> = BTreeMap::new();
        for bar in bars {
            groups
                .entry((bar.symbol.clone(), bar.date))
                .or_default()
                .push(bar.clone());
        }
        for ((symbol, date), group) in &groups {
            let path = self.partition_path(name, EQUITY_KEY, [symbol, &format_date(*date)]);
            write_atomic(&mut equities_frame(group)?, &path)?;
        }
        debug!(dataset = name, files = groups.len(), "wrote equity partitions");
        Ok(groups.len())
    }

    fn write_fx_partitioned(&self, name: &str, rates: &[FxRate]) -> Result<usize, EtlError> {
        let mut groups: BTreeMap<(FxPair, NaiveDate), Vec<FxRate>> = BTreeMap::new();
        for rate in rates {
            groups
                .entry((rate.pair, rate.date))
                .or_default()
                .push(rate.clone());
        }
        for ((pair, date), group) in &groups {
            let path = self.partition_path(name, FX_KEY, [&pair.to_string(), &format_date(*date)]);
            write_atomic(&mut fx_frame(group)?, &path)?;
        }
        debug!(dataset = name, files = groups.len(), "wrote fx partitions");
        Ok(groups.len())
    }

    fn read_equities(&self, name: &str) -> Result<Vec<EquityBar>, EtlError> {
        let df = read_frame(&self.file_path(name))?;
        frame_to_equities(&df)
    }

    fn read_fx(&self, name: &str) -> Result<Vec<FxRate>, EtlError> {
        let df = read_frame(&self.file_path(name))?;
        frame_to_fx(&df)
    }

    fn write_snapshot(&self, name: &str, result: &QueryResult) -> Result<PathBuf, EtlError> {
        let path = self.root.join("snapshots").join(format!("{name}.parquet"));
        let mut df = query_frame(result)?;
        write_atomic(&mut df, &path)?;
        info!(rows = result.rows.len(), path = %path.display(), "wrote snapshot");
        Ok(path)
    }
}

fn polars_err(context: &str) -> impl Fn(PolarsError) -> EtlError + '_ {
    move |e| EtlError::persistence(format!("{context}: {e}"))
}

fn column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Column, EtlError> {
    df.column(name).map_err(polars_err(name))
}

fn epoch_days(date: NaiveDate) -> i32 {
    date.signed_duration_since(NaiveDate::default()).num_days() as i32
}

fn from_epoch_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::default().checked_add_signed(Duration::days(i64::from(days)))
}

fn date_column(name: &str, dates: Vec<Option<i32>>) -> Result<Column, EtlError> {
    Column::new(name.into(), dates)
        .cast(&DataType::Date)
        .map_err(polars_err("date cast"))
}

fn equities_frame(bars: &[EquityBar]) -> Result<DataFrame, EtlError> {
    DataFrame::new(vec![
        Column::new("SYMBOL".into(), bars.iter().map(|b| b.symbol.clone()).collect::<Vec<_>>()),
        date_column("DATE", bars.iter().map(|b| Some(epoch_days(b.date))).collect())?,
        Column::new("OPEN".into(), bars.iter().map(|b| b.open).collect::<Vec<_>>()),
        Column::new("HIGH".into(), bars.iter().map(|b| b.high).collect::<Vec<_>>()),
        Column::new("LOW".into(), bars.iter().map(|b| b.low).collect::<Vec<_>>()),
        Column::new("CLOSE".into(), bars.iter().map(|b| b.close).collect::<Vec<_>>()),
        Column::new("VOLUME".into(), bars.iter().map(|b| b.volume).collect::<Vec<_>>()),
        Column::new("SOURCE".into(), bars.iter().map(|b| b.source.clone()).collect::<Vec<_>>()),
    ])
    .map_err(polars_err("equity frame"))
}

fn fx_frame(rates: &[FxRate]) -> Result<DataFrame, EtlError> {
    DataFrame::new(vec![
        Column::new("PAIR".into(), rates.iter().map(|r| r.pair.to_string()).collect::<Vec<_>>()),
        date_column("DATE", rates.iter().map(|r| Some(epoch_days(r.date))).collect())?,
        Column::new("RATE".into(), rates.iter().map(|r| r.rate).collect::<Vec<_>>()),
        Column::new("SOURCE".into(), rates.iter().map(|r| r.source.clone()).collect::<Vec<_>>()),
    ])
    .map_err(polars_err("fx frame"))
}

static NULL: SqlValue = SqlValue::Null;

/// Column type inferred from the non-null cells of one result column.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Kind {
    Integer,
    Real,
    Date,
    Text,
}

fn infer_kind(cells: &[&SqlValue]) -> Kind {
    let mut kind: Option<Kind> = None;
    for cell in cells {
        let next = match cell {
            SqlValue::Null => continue,
            SqlValue::Integer(_) => Kind::Integer,
            SqlValue::Real(_) => Kind::Real,
            SqlValue::Date(_) => Kind::Date,
            SqlValue::Text(s) if s.len() == 10 && parse_date(s).is_some() => Kind::Date,
            SqlValue::Text(_) => Kind::Text,
        };
        kind = Some(match (kind, next) {
            (None, k) => k,
            (Some(a), b) if a == b => a,
            (Some(Kind::Integer), Kind::Real) | (Some(Kind::Real), Kind::Integer) => Kind::Real,
            _ => Kind::Text,
        });
    }
    kind.unwrap_or(Kind::Text)
}

fn query_frame(result: &QueryResult) -> Result<DataFrame, EtlError> {
    let mut columns = Vec::with_capacity(result.columns.len());
    for (i, name) in result.columns.iter().enumerate() {
        let cells: Vec<&SqlValue> = result
            .rows
            .iter()
            .map(|row| row.get(i).unwrap_or(&NULL))
            .collect();
        let column = match infer_kind(&cells) {
            Kind::Integer => Column::new(
                name.as_str().into(),
                cells.iter().map(|c| c.as_i64()).collect::<Vec<_>>(),
            ),
            Kind::Real => Column::new(
                name.as_str().into(),
                cells.iter().map(|c| c.as_f64()).collect::<Vec<_>>(),
            ),
            Kind::Date => date_column(
                name,
                cells.iter().map(|c| c.as_date().map(epoch_days)).collect(),
            )?,
            Kind::Text => Column::new(
                name.as_str().into(),
                cells.iter().map(|c| c.as_text()).collect::<Vec<_>>(),
            ),
        };
        columns.push(column);
    }
    DataFrame::new(columns).map_err(polars_err("snapshot frame"))
}

fn write_atomic(df: &mut DataFrame, path: &Path) -> Result<(), EtlError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("parquet.tmp");
    let file = fs::File::create(&tmp_path)?;
    ParquetWriter::new(file)
        .finish(df)
        .map_err(polars_err("write parquet"))?;
    fs::rename(&tmp_path, path).inspect_err(|_| {
        let _ = fs::remove_file(&tmp_path);
    })?;
    Ok(())
}

fn read_frame(path: &Path) -> Result<DataFrame, EtlError> {
    let file = fs::File::open(path)?;
    ParquetReader::new(file)
        .finish()
        .map_err(polars_err("read parquet"))
}

fn frame_to_equities(df: &DataFrame) -> Result<Vec<EquityBar>, EtlError> {
    let symbols = column(df, "SYMBOL")?.str().map_err(polars_err("SYMBOL"))?;
    let dates = column(df, "DATE")?.date().map_err(polars_err("DATE"))?;
    let opens = column(df, "OPEN")?.f64().map_err(polars_err("OPEN"))?;
    let highs = column(df, "HIGH")?.f64().map_err(polars_err("HIGH"))?;
    let lows = column(df, "LOW")?.f64().map_err(polars_err("LOW"))?;
    let closes = column(df, "CLOSE")?.f64().map_err(polars_err("CLOSE"))?;
    let volumes = column(df, "VOLUME")?.i64().map_err(polars_err("VOLUME"))?;
    let sources = column(df, "SOURCE")?.str().map_err(polars_err("SOURCE"))?;

    let mut bars = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let (Some(symbol), Some(date), Some(close)) = (
            symbols.get(i),
            dates.get(i).and_then(from_epoch_days),
            closes.get(i),
        ) else {
            return Err(EtlError::persistence(format!("null key or close at row {i}")));
        };
        bars.push(EquityBar {
            symbol: symbol.to_string(),
            date,
            open: opens.get(i),
            high: highs.get(i),
            low: lows.get(i),
            close,
            volume: volumes.get(i).unwrap_or(0),
            source: sources.get(i).unwrap_or_default().to_string(),
        });
    }
    Ok(bars)
}

fn frame_to_fx(df: &DataFrame) -> Result<Vec<FxRate>, EtlError> {
    let pairs = column(df, "PAIR")?.str().map_err(polars_err("PAIR"))?;
    let dates = column(df, "DATE")?.date().map_err(polars_err("DATE"))?;
    let rates = column(df, "RATE")?.f64().map_err(polars_err("RATE"))?;
    let sources = column(df, "SOURCE")?.str().map_err(polars_err("SOURCE"))?;

    let mut out = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let (Some(pair), Some(date), Some(rate)) = (
            pairs.get(i).and_then(FxPair::parse),
            dates.get(i).and_then(from_epoch_days),
            rates.get(i),
        ) else {
            return Err(EtlError::persistence(format!("null or invalid key at row {i}")));
        };
        out.push(FxRate {
            pair,
            date,
            rate,
            source: sources.get(i).unwrap_or_default().to_string(),
        });
    }
    Ok(out)
}
