//! Runtime orchestration layer for Fleet Analytics.
//!
//! Fans per-entity analysis out over a tokio worker pool and synthesises
//! ambient-temperature columns for fleets recorded without one.

pub mod temperature;
pub mod workers;

pub use analytics_core as core;
pub use analytics_data as data;
