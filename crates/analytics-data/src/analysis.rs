//! Per-entity analysis pipeline.
//!
//! Runs every configured report over one entity's time series: binned
//! correlations, per-state temporal aggregates and, when a temperature
//! column is attached, the temperature correlation quartet.

use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use analytics_core::models::{BinnedSeries, EntityTimeSeries, StateSeries, Variable};
use analytics_core::settings::AnalysisOptions;

use crate::binning::{is_braking, BinnedCorrelation};
use crate::temporal::TemporalAggregator;

/// Bin count for the coarse battery-drain-by-temperature profile.
const DRAIN_PROFILE_BINS: usize = 5;

// ── Public types ──────────────────────────────────────────────────────────────

/// Metadata produced alongside each entity report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityMetadata {
    /// ISO-8601 timestamp when this report was generated.
    pub generated_at: String,
    /// Number of samples analysed.
    pub samples: usize,
    /// Operating states observed, in order of first appearance.
    pub states: Vec<String>,
    /// Whether a temperature column was attached.
    pub has_temperature: bool,
    /// Wall-clock seconds spent computing the report.
    pub aggregate_time_seconds: f64,
}

/// The complete analysis output for one entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityReport {
    pub entity_id: String,
    /// Mean braking intensity per speed bin, braking rows only.
    pub braking_by_speed: BinnedSeries,
    /// Mean energy impact per battery-level bin.
    pub energy_by_battery: BinnedSeries,
    /// Battery level smoothed and resampled per operating state.
    pub battery_by_state: Vec<StateSeries>,
    /// Temperature correlation reports; empty without a temperature column.
    pub temperature: Vec<BinnedSeries>,
    pub metadata: EntityMetadata,
}

// ── Public function ───────────────────────────────────────────────────────────

/// Run every configured report over `series`.
///
/// The computation is pure apart from the generated-at timestamp and the
/// timing field in the metadata: the same series and options always yield
/// the same report series.
pub fn analyze_entity(series: &EntityTimeSeries, options: &AnalysisOptions) -> EntityReport {
    let start = Instant::now();

    // ── Braking intensity vs speed ────────────────────────────────────────────
    let braking_by_speed = BinnedCorrelation::binned_mean(
        series,
        Variable::Speed,
        Variable::Acceleration,
        Some(is_braking),
        options.bin_count,
    );

    // ── Energy impact vs battery level ────────────────────────────────────────
    let energy_by_battery = BinnedCorrelation::binned_mean(
        series,
        Variable::BatteryLevel,
        Variable::EnergyImpact,
        None,
        options.bin_count,
    );

    // ── Battery level per operating state ─────────────────────────────────────
    let battery_by_state = TemporalAggregator::by_state(series, Variable::BatteryLevel, options);

    // ── Temperature quartet ───────────────────────────────────────────────────
    let temperature = if series.temperature.is_some() {
        vec![
            BinnedCorrelation::binned_mean(
                series,
                Variable::Temperature,
                Variable::Acceleration,
                None,
                options.bin_count,
            ),
            BinnedCorrelation::binned_mean(
                series,
                Variable::Temperature,
                Variable::BatteryLevel,
                None,
                DRAIN_PROFILE_BINS,
            ),
            BinnedCorrelation::binned_mean(
                series,
                Variable::Temperature,
                Variable::EnergyImpact,
                None,
                options.bin_count,
            ),
            BinnedCorrelation::binned_mean(
                series,
                Variable::Temperature,
                Variable::BatteryEfficiency,
                None,
                options.bin_count,
            ),
        ]
    } else {
        Vec::new()
    };

    let metadata = EntityMetadata {
        generated_at: Utc::now().to_rfc3339(),
        samples: series.len(),
        states: TemporalAggregator::observed_states(series),
        has_temperature: series.temperature.is_some(),
        aggregate_time_seconds: start.elapsed().as_secs_f64(),
    };

    debug!(
        "Analysed entity {}: {} samples, {} states, {} temperature reports",
        series.entity_id,
        metadata.samples,
        metadata.states.len(),
        temperature.len()
    );

    EntityReport {
        entity_id: series.entity_id.clone(),
        braking_by_speed,
        energy_by_battery,
        battery_by_state,
        temperature,
        metadata,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use analytics_core::models::TelemetrySample;
    use chrono::{TimeZone as _, Utc};

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn sample(
        minute: u32,
        speed: f64,
        acceleration: f64,
        battery_level: f64,
        state: &str,
    ) -> TelemetrySample {
        TelemetrySample {
            entity_id: "scooter_1".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 6, 15, 10, minute, 0).unwrap(),
            speed,
            acceleration,
            wheel_rotation: 100.0,
            battery_level,
            state: state.to_string(),
        }
    }

    /// Six samples, two states, three of them braking.
    fn ride_series() -> EntityTimeSeries {
        EntityTimeSeries {
            entity_id: "scooter_1".to_string(),
            samples: vec![
                sample(0, 18.0, 0.4, 82.0, "riding"),
                sample(1, 22.0, -1.2, 81.0, "riding"),
                sample(2, 15.0, -0.6, 80.5, "riding"),
                sample(3, 0.0, 0.0, 80.5, "idle"),
                sample(4, 9.0, -2.0, 80.0, "riding"),
                sample(5, 0.0, 0.0, 80.0, "idle"),
            ],
            temperature: None,
        }
    }

    // ── analyze_entity ────────────────────────────────────────────────────────

    #[test]
    fn test_report_shape() {
        let report = analyze_entity(&ride_series(), &AnalysisOptions::default());

        assert_eq!(report.entity_id, "scooter_1");
        assert_eq!(report.braking_by_speed.key, Variable::Speed);
        assert_eq!(report.braking_by_speed.value, Variable::Acceleration);
        assert_eq!(report.energy_by_battery.key, Variable::BatteryLevel);
        assert_eq!(report.energy_by_battery.value, Variable::EnergyImpact);
        assert_eq!(report.battery_by_state.len(), 2);
        assert!(report.temperature.is_empty());
    }

    #[test]
    fn test_braking_covers_only_braking_rows() {
        let report = analyze_entity(&ride_series(), &AnalysisOptions::default());
        let total: usize = report.braking_by_speed.bins.iter().map(|b| b.count).sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn test_metadata_fields_populated() {
        let report = analyze_entity(&ride_series(), &AnalysisOptions::default());

        assert!(!report.metadata.generated_at.is_empty());
        assert_eq!(report.metadata.samples, 6);
        assert_eq!(
            report.metadata.states,
            vec!["riding".to_string(), "idle".to_string()]
        );
        assert!(!report.metadata.has_temperature);
        assert!(report.metadata.aggregate_time_seconds >= 0.0);
    }

    #[test]
    fn test_temperature_quartet_when_attached() {
        let mut series = ride_series();
        series.temperature = Some(vec![12.0, 13.0, 14.0, 15.0, 16.0, 17.0]);

        let options = AnalysisOptions::default();
        let report = analyze_entity(&series, &options);

        assert!(report.metadata.has_temperature);
        assert_eq!(report.temperature.len(), 4);

        let values: Vec<Variable> = report.temperature.iter().map(|s| s.value).collect();
        assert_eq!(
            values,
            vec![
                Variable::Acceleration,
                Variable::BatteryLevel,
                Variable::EnergyImpact,
                Variable::BatteryEfficiency,
            ]
        );
        for binned in &report.temperature {
            assert_eq!(binned.key, Variable::Temperature);
        }
        // The drain profile is deliberately coarse.
        assert_eq!(report.temperature[1].bin_count, DRAIN_PROFILE_BINS);
        assert_eq!(report.temperature[0].bin_count, options.bin_count);
    }

    #[test]
    fn test_analysis_is_deterministic() {
        let series = ride_series();
        let options = AnalysisOptions::default();

        let first = analyze_entity(&series, &options);
        let second = analyze_entity(&series, &options);

        assert_eq!(first.braking_by_speed, second.braking_by_speed);
        assert_eq!(first.energy_by_battery, second.energy_by_battery);
        assert_eq!(first.battery_by_state, second.battery_by_state);
        assert_eq!(first.temperature, second.temperature);
    }

    #[test]
    fn test_report_serializes() {
        let report = analyze_entity(&ride_series(), &AnalysisOptions::default());
        let json = serde_json::to_string(&report).expect("serialize");
        let back: EntityReport = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.entity_id, "scooter_1");
        assert_eq!(back.braking_by_speed, report.braking_by_speed);
    }
}
