//! Concrete adapter implementations for ports.

#[cfg(feature = "postgres")]
pub mod postgres_adapter;
#[cfg(feature = "sqlite")]
pub mod sqlite_adapter;

pub mod alpha_vantage;
pub mod ecb;
pub mod file_config_adapter;
pub mod http_adapter;
pub mod object_store;
pub mod parquet_adapter;
pub mod slack_notifier;
pub mod stooq;

#[cfg(test)]
pub(crate) mod stub_http;
