//! Core domain types for Fleet Analytics.
//!
//! Holds the telemetry data model, the error taxonomy, CLI settings with
//! persisted last-used parameters, and timezone/timestamp helpers shared by
//! the ingestion and aggregation layers.

pub mod error;
pub mod models;
pub mod settings;
pub mod time_utils;
