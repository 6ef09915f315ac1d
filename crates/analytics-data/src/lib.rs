//! Data ingestion and aggregation layer for Fleet Analytics.
//!
//! Responsible for reading telemetry CSV files in subsampled blocks,
//! assembling per-entity time series, computing temporal aggregates and
//! binned correlations, and running the per-entity analysis pipeline.

pub mod analysis;
pub mod binning;
pub mod chunk;
pub mod loader;
pub mod temporal;

pub use analytics_core as core;
