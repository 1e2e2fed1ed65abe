//! portfolio-etl: daily market data and portfolio ETL.
//!
//! Hexagonal layout: pipeline logic in [`domain`], port traits in [`ports`],
//! concrete providers, warehouses and stores in [`adapters`], and the command
//! line in [`cli`].

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod ports;
