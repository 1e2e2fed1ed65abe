//! Core domain types and pipeline logic.

pub mod error;
pub mod bar;
pub mod fx;
pub mod transaction;
pub mod cleaning;
pub mod profile;
pub mod retry;
pub mod extract;
pub mod watermark;
pub mod schema;
pub mod loader;
pub mod quality;
pub mod transforms;
pub mod export;
pub mod config;
pub mod pipeline;
