//! Pipeline configuration.
//!
//! Assembled once at startup from a [`ConfigPort`] and passed by reference to
//! every component. Nothing else reads configuration or the environment.

use super::error::EtlError;
use super::fx::{FxPair, parse_pairs};
use super::quality::QualityMode;
use super::retry::RetryPolicy;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SYMBOLS: &str = "AAPL,MSFT,GOOGL";
pub const DEFAULT_FX_PAIRS: &str = "USDGBP,EURUSD,EURGBP";
pub const ALPHA_VANTAGE_URL: &str = "https://www.alphavantage.co/query";
pub const STOOQ_URL: &str = "https://stooq.com/q/d/l/";
pub const ECB_URL: &str = "https://www.ecb.europa.eu/stats/eurofxref/eurofxref-hist.csv";
pub const DEFAULT_SNAPSHOT_PREFIX: &str = "snapshots/portfolio_metrics";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarehouseBackend {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WarehouseConfig {
    pub backend: WarehouseBackend,
    pub sqlite_path: Option<String>,
    pub postgres_connection: Option<String>,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectStoreKind {
    None,
    Fs,
    Http,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectStoreConfig {
    pub kind: ObjectStoreKind,
    pub root: Option<PathBuf>,
    pub endpoint: Option<String>,
    pub bucket: Option<String>,
    pub token: Option<String>,
    pub prefix: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QualityConfig {
    pub mode: QualityMode,
    pub fx_join_pair: FxPair,
    pub require_today: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub alphavantage_api_key: Option<String>,
    pub alphavantage_url: String,
    pub stooq_url: String,
    pub ecb_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub symbols: Vec<String>,
    pub benchmark: String,
    pub start_date: NaiveDate,
    pub data_dir: PathBuf,
    pub equity_sources: Vec<String>,
    pub fx_sources: Vec<String>,
    pub fx_pairs: Vec<FxPair>,
    pub partitioned: bool,
    pub snapshot_days: u32,
    pub providers: ProviderConfig,
    pub retry: RetryPolicy,
    pub warehouse: WarehouseConfig,
    pub quality: QualityConfig,
    pub slack_webhook_url: Option<String>,
    pub object_store: ObjectStoreConfig,
}

const EQUITY_SOURCES: [&str; 2] = ["stooq", "alphavantage"];
const FX_SOURCES: [&str; 3] = ["ecb", "stooq", "alphavantage"];

impl PipelineConfig {
    pub fn from_port(config: &dyn ConfigPort) -> Result<Self, EtlError> {
        let symbols = parse_list(&string_or(config, "pipeline", "symbols", DEFAULT_SYMBOLS))
            .into_iter()
            .map(|s| s.to_uppercase())
            .collect::<Vec<_>>();
        if symbols.is_empty() {
            return Err(EtlError::invalid("pipeline", "symbols", "at least one symbol is required"));
        }

        let benchmark = string_or(config, "pipeline", "benchmark", "SPY").to_uppercase();

        let start_str = string_or(config, "pipeline", "start_date", "2018-01-01");
        let start_date = NaiveDate::parse_from_str(&start_str, "%Y-%m-%d").map_err(|_| {
            EtlError::invalid("pipeline", "start_date", "invalid date format (expected YYYY-MM-DD)")
        })?;

        let equity_sources = validate_sources(
            config,
            "equity_sources",
            "stooq,alphavantage",
            &EQUITY_SOURCES,
        )?;
        let fx_sources = validate_sources(config, "fx_sources", "ecb", &FX_SOURCES)?;

        let fx_pairs = parse_pairs(&string_or(config, "pipeline", "fx_pairs", DEFAULT_FX_PAIRS))
            .map_err(|reason| EtlError::invalid("pipeline", "fx_pairs", reason))?;
        if fx_pairs.is_empty() {
            return Err(EtlError::invalid("pipeline", "fx_pairs", "at least one pair is required"));
        }

        let snapshot_days = config.get_int("pipeline", "snapshot_days", 30)?;
        if !(1..=3650).contains(&snapshot_days) {
            return Err(EtlError::invalid(
                "pipeline",
                "snapshot_days",
                "snapshot_days must be between 1 and 3650",
            ));
        }

        let providers = ProviderConfig {
            alphavantage_api_key: non_empty(config.get_string("alphavantage", "api_key")),
            alphavantage_url: string_or(config, "alphavantage", "base_url", ALPHA_VANTAGE_URL),
            stooq_url: string_or(config, "stooq", "base_url", STOOQ_URL),
            ecb_url: string_or(config, "ecb", "url", ECB_URL),
        };
        let uses_alpha = equity_sources.iter().chain(&fx_sources).any(|s| s == "alphavantage");
        if uses_alpha && providers.alphavantage_api_key.is_none() {
            return Err(EtlError::missing("alphavantage", "api_key"));
        }

        Ok(Self {
            symbols,
            benchmark,
            start_date,
            data_dir: PathBuf::from(string_or(config, "pipeline", "data_dir", "./data")),
            equity_sources,
            fx_sources,
            fx_pairs,
            partitioned: config.get_bool("pipeline", "partitioned", true)?,
            snapshot_days: snapshot_days as u32,
            providers,
            retry: build_retry(config)?,
            warehouse: build_warehouse(config)?,
            quality: build_quality(config)?,
            slack_webhook_url: non_empty(config.get_string("slack", "webhook_url")),
            object_store: build_object_store(config)?,
        })
    }

    /// Symbols to fetch: the configured list plus the benchmark.
    pub fn all_symbols(&self) -> Vec<String> {
        let mut all = self.symbols.clone();
        if !all.contains(&self.benchmark) {
            all.push(self.benchmark.clone());
        }
        all
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.data_dir.join("processed")
    }
}

/// Ten minutes.
const MAX_BASE_DELAY_MS: i64 = 600_000;

fn build_retry(config: &dyn ConfigPort) -> Result<RetryPolicy, EtlError> {
    let max_attempts = config.get_int("retry", "max_attempts", 5)?;
    if !(1..=20).contains(&max_attempts) {
        return Err(EtlError::invalid(
            "retry",
            "max_attempts",
            "max_attempts must be between 1 and 20",
        ));
    }
    let base_delay_ms = config.get_int("retry", "base_delay_ms", 2000)?;
    if !(0..=MAX_BASE_DELAY_MS).contains(&base_delay_ms) {
        return Err(EtlError::invalid(
            "retry",
            "base_delay_ms",
            "base_delay_ms must be between 0 and 600000",
        ));
    }
    Ok(RetryPolicy::new(
        max_attempts as u32,
        Duration::from_millis(base_delay_ms as u64),
    ))
}

fn build_warehouse(config: &dyn ConfigPort) -> Result<WarehouseConfig, EtlError> {
    let backend = match string_or(config, "warehouse", "backend", "sqlite")
        .to_lowercase()
        .as_str()
    {
        "sqlite" => WarehouseBackend::Sqlite,
        "postgres" | "postgresql" => WarehouseBackend::Postgres,
        other => {
            return Err(EtlError::invalid(
                "warehouse",
                "backend",
                format!("unknown backend '{other}' (expected sqlite or postgres)"),
            ));
        }
    };

    let section = match backend {
        WarehouseBackend::Sqlite => "sqlite",
        WarehouseBackend::Postgres => "postgres",
    };
    let pool_size = config.get_int(section, "pool_size", 4)?;
    if !(1..=64).contains(&pool_size) {
        return Err(EtlError::invalid(section, "pool_size", "pool_size must be between 1 and 64"));
    }

    let sqlite_path = non_empty(config.get_string("sqlite", "path"));
    let postgres_connection = non_empty(config.get_string("postgres", "connection_string"));
    match backend {
        WarehouseBackend::Sqlite if sqlite_path.is_none() => {
            return Err(EtlError::missing("sqlite", "path"));
        }
        WarehouseBackend::Postgres if postgres_connection.is_none() => {
            return Err(EtlError::missing("postgres", "connection_string"));
        }
        _ => {}
    }

    Ok(WarehouseConfig {
        backend,
        sqlite_path,
        postgres_connection,
        pool_size: pool_size as u32,
    })
}

fn build_quality(config: &dyn ConfigPort) -> Result<QualityConfig, EtlError> {
    let mode = string_or(config, "quality", "mode", "aggregate")
        .parse::<QualityMode>()
        .map_err(|reason| EtlError::invalid("quality", "mode", reason))?;
    let pair_str = string_or(config, "quality", "fx_join_pair", "USDGBP");
    let fx_join_pair = FxPair::parse(&pair_str).ok_or_else(|| {
        EtlError::invalid("quality", "fx_join_pair", format!("invalid pair '{pair_str}'"))
    })?;
    Ok(QualityConfig {
        mode,
        fx_join_pair,
        require_today: config.get_bool("quality", "require_today", true)?,
    })
}

fn build_object_store(config: &dyn ConfigPort) -> Result<ObjectStoreConfig, EtlError> {
    let kind = match string_or(config, "object_store", "kind", "none")
        .to_lowercase()
        .as_str()
    {
        "none" => ObjectStoreKind::None,
        "fs" => ObjectStoreKind::Fs,
        "http" => ObjectStoreKind::Http,
        other => {
            return Err(EtlError::invalid(
                "object_store",
                "kind",
                format!("unknown kind '{other}' (expected none, fs or http)"),
            ));
        }
    };

    let root = non_empty(config.get_string("object_store", "root")).map(PathBuf::from);
    let endpoint = non_empty(config.get_string("object_store", "endpoint"));
    let bucket = non_empty(config.get_string("object_store", "bucket"));
    match kind {
        ObjectStoreKind::Fs if root.is_none() => return Err(EtlError::missing("object_store", "root")),
        ObjectStoreKind::Http if endpoint.is_none() => {
            return Err(EtlError::missing("object_store", "endpoint"));
        }
        ObjectStoreKind::Http if bucket.is_none() => {
            return Err(EtlError::missing("object_store", "bucket"));
        }
        _ => {}
    }

    Ok(ObjectStoreConfig {
        kind,
        root,
        endpoint,
        bucket,
        token: non_empty(config.get_string("object_store", "token")),
        prefix: string_or(config, "object_store", "prefix", DEFAULT_SNAPSHOT_PREFIX),
    })
}

fn validate_sources(
    config: &dyn ConfigPort,
    key: &str,
    default: &str,
    known: &[&str],
) -> Result<Vec<String>, EtlError> {
    let sources: Vec<String> = parse_list(&string_or(config, "pipeline", key, default))
        .into_iter()
        .map(|s| s.to_lowercase())
        .collect();
    if sources.is_empty() {
        return Err(EtlError::invalid("pipeline", key, "at least one source is required"));
    }
    if let Some(unknown) = sources.iter().find(|s| !known.contains(&s.as_str())) {
        return Err(EtlError::invalid(
            "pipeline",
            key,
            format!("unknown source '{unknown}' (expected one of: {})", known.join(", ")),
        ));
    }
    Ok(sources)
}

fn string_or(config: &dyn ConfigPort, section: &str, key: &str, default: &str) -> String {
    non_empty(config.get_string(section, key)).unwrap_or_else(|| default.to_string())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Split a comma-separated list, trimming and skipping blanks.
pub fn parse_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MockConfig {
        values: HashMap<(String, String), String>,
    }

    impl MockConfig {
        fn new(entries: &[(&str, &str, &str)]) -> Self {
            let values = entries
                .iter()
                .map(|(s, k, v)| ((s.to_string(), k.to_string()), v.to_string()))
                .collect();
            Self { values }
        }
    }

    impl ConfigPort for MockConfig {
        fn get_string(&self, section: &str, key: &str) -> Option<String> {
            self.values.get(&(section.to_string(), key.to_string())).cloned()
        }
    }

    fn minimal() -> Vec<(&'static str, &'static str, &'static str)> {
        vec![
            ("sqlite", "path", "/tmp/warehouse.db"),
            ("pipeline", "equity_sources", "stooq"),
        ]
    }

    fn with(extra: &[(&'static str, &'static str, &'static str)]) -> MockConfig {
        let mut entries = minimal();
        entries.extend_from_slice(extra);
        MockConfig::new(&entries)
    }

    #[test]
    fn defaults_apply() {
        let config = PipelineConfig::from_port(&with(&[])).unwrap();
        assert_eq!(config.symbols, vec!["AAPL", "MSFT", "GOOGL"]);
        assert_eq!(config.benchmark, "SPY");
        assert_eq!(config.start_date, NaiveDate::from_ymd_opt(2018, 1, 1).unwrap());
        assert_eq!(config.fx_sources, vec!["ecb"]);
        assert_eq!(config.fx_pairs.len(), 3);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay, Duration::from_secs(2));
        assert_eq!(config.quality.mode, QualityMode::Aggregate);
        assert_eq!(config.quality.fx_join_pair.to_string(), "USDGBP");
        assert!(config.quality.require_today);
        assert!(config.partitioned);
        assert_eq!(config.snapshot_days, 30);
        assert_eq!(config.object_store.kind, ObjectStoreKind::None);
        assert_eq!(config.object_store.prefix, DEFAULT_SNAPSHOT_PREFIX);
        assert_eq!(config.warehouse.backend, WarehouseBackend::Sqlite);
        assert_eq!(config.processed_dir(), PathBuf::from("./data/processed"));
    }

    #[test]
    fn all_symbols_appends_benchmark_once() {
        let config = PipelineConfig::from_port(&with(&[("pipeline", "symbols", "aapl, spy")])).unwrap();
        assert_eq!(config.all_symbols(), vec!["AAPL", "SPY"]);
    }

    #[test]
    fn alphavantage_requires_api_key() {
        let err = PipelineConfig::from_port(&with(&[(
            "pipeline",
            "equity_sources",
            "stooq,alphavantage",
        )]))
        .unwrap_err();
        assert!(matches!(err, EtlError::ConfigMissing { ref section, ref key } if section == "alphavantage" && key == "api_key"));
    }

    #[test]
    fn unknown_source_rejected() {
        let err = PipelineConfig::from_port(&with(&[("pipeline", "fx_sources", "ecb,bloomberg")]))
            .unwrap_err();
        assert!(err.to_string().contains("bloomberg"));
    }

    #[test]
    fn bad_start_date_rejected() {
        let err = PipelineConfig::from_port(&with(&[("pipeline", "start_date", "01/02/2024")]))
            .unwrap_err();
        assert!(matches!(err, EtlError::ConfigInvalid { ref key, .. } if key == "start_date"));
    }

    #[test]
    fn bad_quality_mode_rejected() {
        let err = PipelineConfig::from_port(&with(&[("quality", "mode", "strict")])).unwrap_err();
        assert!(matches!(err, EtlError::ConfigInvalid { ref section, .. } if section == "quality"));
    }

    #[test]
    fn missing_sqlite_path_rejected() {
        let config = MockConfig::new(&[("pipeline", "equity_sources", "stooq")]);
        let err = PipelineConfig::from_port(&config).unwrap_err();
        assert!(matches!(err, EtlError::ConfigMissing { ref key, .. } if key == "path"));
    }

    #[test]
    fn postgres_backend_needs_connection_string() {
        let err = PipelineConfig::from_port(&with(&[("warehouse", "backend", "postgres")])).unwrap_err();
        assert!(matches!(err, EtlError::ConfigMissing { ref key, .. } if key == "connection_string"));
    }

    #[test]
    fn http_object_store_needs_bucket() {
        let err = PipelineConfig::from_port(&with(&[
            ("object_store", "kind", "http"),
            ("object_store", "endpoint", "http://localhost:9000"),
        ]))
        .unwrap_err();
        assert!(matches!(err, EtlError::ConfigMissing { ref key, .. } if key == "bucket"));
    }

    #[test]
    fn retry_bounds_checked() {
        let err = PipelineConfig::from_port(&with(&[("retry", "max_attempts", "0")])).unwrap_err();
        assert!(matches!(err, EtlError::ConfigInvalid { ref key, .. } if key == "max_attempts"));
    }

    #[test]
    fn oversized_base_delay_rejected() {
        let err = PipelineConfig::from_port(&with(&[("retry", "base_delay_ms", "9223372036854775807")])).unwrap_err();
        assert!(matches!(err, EtlError::ConfigInvalid { ref key, .. } if key == "base_delay_ms"));
        let ok = PipelineConfig::from_port(&with(&[("retry", "base_delay_ms", "600000")])).unwrap();
        assert_eq!(ok.retry.base_delay, Duration::from_secs(600));
    }

    #[test]
    fn non_numeric_snapshot_days_rejected() {
        let err = PipelineConfig::from_port(&with(&[("pipeline", "snapshot_days", "a month")])).unwrap_err();
        assert!(matches!(err, EtlError::ConfigInvalid { ref key, .. } if key == "snapshot_days"));
    }

    #[test]
    fn parse_list_skips_blanks() {
        assert_eq!(parse_list(" a, ,b ,"), vec!["a", "b"]);
    }
}
