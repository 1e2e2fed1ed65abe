//! CLI definition and dispatch.

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::adapters::alpha_vantage::AlphaVantage;
use crate::adapters::ecb::Ecb;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::http_adapter::ReqwestHttp;
use crate::adapters::object_store::{FsObjectStore, HttpObjectStore};
use crate::adapters::parquet_adapter::ParquetStore;
use crate::adapters::slack_notifier::{LogNotifier, SlackNotifier};
use crate::adapters::stooq::Stooq;
use crate::domain::config::{ObjectStoreKind, PipelineConfig, WarehouseBackend, WarehouseConfig};
use crate::domain::error::EtlError;
use crate::domain::extract::{FallbackEquitySource, FallbackFxSource};
use crate::domain::pipeline::{Pipeline, alert_on_failure};
use crate::domain::quality::CheckStatus;
use crate::domain::schema;
use crate::domain::watermark::WatermarkStore;
use crate::ports::http_port::HttpPort;
use crate::ports::notifier_port::NotifierPort;
use crate::ports::object_store_port::ObjectStorePort;
use crate::ports::source_port::{EquitySource, FxSource};
use crate::ports::warehouse_port::WarehousePort;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "portfolio-etl", about = "Daily market data and portfolio ETL")]
pub struct Cli {
    /// INI configuration file
    #[arg(short, long, global = true, default_value = "portfolio-etl.ini")]
    pub config: PathBuf,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply warehouse DDL or bulk-load the local snapshot files
    Warehouse {
        #[arg(long, value_enum)]
        mode: WarehouseMode,
        /// DDL files applied in order instead of the built-in schema
        #[arg(long)]
        ddl: Vec<PathBuf>,
    },
    /// Fetch full history into local Parquet and log a data profile
    Extract,
    /// Run the daily incremental pipeline
    Incremental {
        #[arg(long)]
        run_date: Option<NaiveDate>,
        #[arg(long)]
        skip_upload: bool,
    },
    /// Run the data-quality gate only
    Quality {
        #[arg(long)]
        run_date: Option<NaiveDate>,
    },
    /// Upsert a portfolio transactions CSV
    LoadTransactions {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Export the portfolio metrics snapshot
    Export {
        #[arg(long)]
        run_date: Option<NaiveDate>,
        #[arg(long)]
        upload: bool,
    },
    /// Print load watermarks
    Status,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum WarehouseMode {
    ApplySchema,
    LoadRaw,
}

impl Command {
    pub fn job_name(&self) -> &'static str {
        match self {
            Command::Warehouse { .. } => "warehouse",
            Command::Extract => "extract",
            Command::Incremental { .. } => "incremental",
            Command::Quality { .. } => "quality",
            Command::LoadTransactions { .. } => "load-transactions",
            Command::Export { .. } => "export",
            Command::Status => "status",
        }
    }
}

pub fn run(cli: Cli) -> ExitCode {
    init_tracing();

    let config = match load_config(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            error!("{e}");
            return (&e).into();
        }
    };
    let http: Arc<dyn HttpPort> = match ReqwestHttp::new(HTTP_TIMEOUT) {
        Ok(h) => Arc::new(h),
        Err(e) => {
            error!("{e}");
            return (&e).into();
        }
    };
    let notifier = build_notifier(&config, &http);

    let job = cli.command.job_name();
    let result = alert_on_failure(
        notifier.as_ref(),
        job,
        execute(&cli.command, &config, &http, notifier.as_ref()),
    );
    match result {
        Ok(()) => {
            info!(job, "done");
            ExitCode::SUCCESS
        }
        Err(e) => (&e).into(),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

pub fn load_config(path: &Path) -> Result<PipelineConfig, EtlError> {
    info!(path = %path.display(), "loading config");
    let adapter = FileConfigAdapter::from_file(path)?;
    PipelineConfig::from_port(&adapter)
}

fn execute(
    command: &Command,
    config: &PipelineConfig,
    http: &Arc<dyn HttpPort>,
    notifier: &dyn NotifierPort,
) -> Result<(), EtlError> {
    let warehouse = open_warehouse(&config.warehouse)?;
    let equities = build_equity_source(config, http);
    let fx = build_fx_source(config, http);
    let datasets = ParquetStore::new(config.processed_dir());
    let object_store = build_object_store(config, http);

    let mut pipeline = Pipeline::new(config, &equities, &fx, warehouse.as_ref(), &datasets, notifier);
    if let Some(store) = object_store.as_deref() {
        pipeline = pipeline.with_object_store(store);
    }

    match command {
        Command::Warehouse { mode, ddl } => match mode {
            WarehouseMode::ApplySchema => {
                let applied = if ddl.is_empty() {
                    schema::apply_default(warehouse.as_ref())?
                } else {
                    schema::apply_files(warehouse.as_ref(), ddl)?
                };
                info!(statements = applied, "schema applied");
                Ok(())
            }
            WarehouseMode::LoadRaw => {
                let (eq, fx) = pipeline.load_raw()?;
                info!(equities = eq.rows_written, fx = fx.rows_written, "raw load complete");
                Ok(())
            }
        },
        Command::Extract => {
            pipeline.run_local_extract()?;
            Ok(())
        }
        Command::Incremental {
            run_date,
            skip_upload,
        } => {
            let report = pipeline.run_daily(resolve_run_date(*run_date), *skip_upload)?;
            info!(
                equities = report.incremental.equities.rows_loaded,
                fx = report.incremental.fx.rows_loaded,
                exported = report.export.rows,
                uploaded = ?report.uploaded_key,
                "incremental run summary"
            );
            Ok(())
        }
        Command::Quality { run_date } => {
            let results = pipeline.run_quality(resolve_run_date(*run_date))?;
            let passed = results.iter().filter(|r| r.status == CheckStatus::Pass).count();
            info!(passed, total = results.len(), "quality checks passed");
            Ok(())
        }
        Command::LoadTransactions { csv } => {
            let report = pipeline.load_transactions(csv)?;
            info!(staged = report.staged, merged = report.merged, "transactions merged");
            Ok(())
        }
        Command::Export { run_date, upload } => {
            let report = pipeline.export(resolve_run_date(*run_date))?;
            if *upload {
                pipeline.upload(&report.path)?;
            }
            Ok(())
        }
        Command::Status => {
            let watermarks = WatermarkStore::new(warehouse.as_ref()).list()?;
            if watermarks.is_empty() {
                println!("no loads recorded");
            }
            for w in watermarks {
                println!(
                    "{:<12} {}  (updated {})",
                    w.source_name,
                    w.last_loaded_date,
                    w.updated_at.as_deref().unwrap_or("-")
                );
            }
            Ok(())
        }
    }
}

fn resolve_run_date(run_date: Option<NaiveDate>) -> NaiveDate {
    run_date.unwrap_or_else(|| Local::now().date_naive())
}

pub fn open_warehouse(config: &WarehouseConfig) -> Result<Box<dyn WarehousePort>, EtlError> {
    match config.backend {
        #[cfg(feature = "sqlite")]
        WarehouseBackend::Sqlite => {
            use crate::adapters::sqlite_adapter::SqliteWarehouse;
            Ok(Box::new(SqliteWarehouse::from_config(config)?))
        }
        #[cfg(feature = "postgres")]
        WarehouseBackend::Postgres => {
            use crate::adapters::postgres_adapter::PostgresWarehouse;
            Ok(Box::new(PostgresWarehouse::from_config(config)?))
        }
        #[allow(unreachable_patterns)]
        other => Err(EtlError::invalid(
            "warehouse",
            "backend",
            format!("{other:?} support is not compiled in"),
        )),
    }
}

/// Ordered fallback over the configured equity sources.
pub fn build_equity_source(config: &PipelineConfig, http: &Arc<dyn HttpPort>) -> FallbackEquitySource {
    let sources = config
        .equity_sources
        .iter()
        .map(|name| -> Box<dyn EquitySource> {
            match name.as_str() {
                "alphavantage" => Box::new(alpha_vantage(config, http)),
                _ => Box::new(Stooq::new(http.clone(), config.retry, &config.providers.stooq_url)),
            }
        })
        .collect();
    FallbackEquitySource::new(sources)
}

pub fn build_fx_source(config: &PipelineConfig, http: &Arc<dyn HttpPort>) -> FallbackFxSource {
    let sources = config
        .fx_sources
        .iter()
        .map(|name| -> Box<dyn FxSource> {
            match name.as_str() {
                "alphavantage" => Box::new(alpha_vantage(config, http)),
                "stooq" => Box::new(Stooq::new(http.clone(), config.retry, &config.providers.stooq_url)),
                _ => Box::new(Ecb::new(http.clone(), config.retry, &config.providers.ecb_url)),
            }
        })
        .collect();
    FallbackFxSource::new(sources)
}

fn alpha_vantage(config: &PipelineConfig, http: &Arc<dyn HttpPort>) -> AlphaVantage {
    AlphaVantage::new(
        http.clone(),
        config.retry,
        &config.providers.alphavantage_url,
        config.providers.alphavantage_api_key.as_deref().unwrap_or_default(),
        &config.benchmark,
    )
}

pub fn build_notifier(config: &PipelineConfig, http: &Arc<dyn HttpPort>) -> Box<dyn NotifierPort> {
    match &config.slack_webhook_url {
        Some(url) => Box::new(SlackNotifier::new(http.clone(), url)),
        None => Box::new(LogNotifier),
    }
}

pub fn build_object_store(
    config: &PipelineConfig,
    http: &Arc<dyn HttpPort>,
) -> Option<Box<dyn ObjectStorePort>> {
    let store = &config.object_store;
    match store.kind {
        ObjectStoreKind::None => None,
        ObjectStoreKind::Fs => store
            .root
            .as_ref()
            .map(|root| Box::new(FsObjectStore::new(root)) as Box<dyn ObjectStorePort>),
        ObjectStoreKind::Http => match (&store.endpoint, &store.bucket) {
            (Some(endpoint), Some(bucket)) => Some(Box::new(HttpObjectStore::new(
                http.clone(),
                endpoint,
                bucket,
                store.token.clone(),
            ))),
            _ => None,
        },
    }
}
