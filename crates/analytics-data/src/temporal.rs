//! Temporal aggregation over per-entity telemetry.
//!
//! Two views are computed per observed operating state: a trailing rolling
//! mean over the state's samples, and a resampling onto fixed, clock-aligned
//! time buckets.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};

use analytics_core::models::{
    EntityTimeSeries, ResampledPoint, SmoothedPoint, StateSeries, Variable,
};
use analytics_core::settings::AnalysisOptions;
use analytics_core::time_utils::floor_to_interval;

// ── TemporalAggregator ────────────────────────────────────────────────────────

/// Stateless helper producing smoothed and resampled series.
pub struct TemporalAggregator;

impl TemporalAggregator {
    /// Distinct operating states in order of first appearance.
    pub fn observed_states(series: &EntityTimeSeries) -> Vec<String> {
        let mut states: Vec<String> = Vec::new();
        for sample in &series.samples {
            if !states.contains(&sample.state) {
                states.push(sample.state.clone());
            }
        }
        states
    }

    /// Trailing rolling mean over `values` with the given window.
    ///
    /// The first `window - 1` positions have no full window yet and are
    /// `None`. A window containing a missing (NaN) value yields `None` as
    /// well; the mean recovers once the missing value leaves the window.
    pub fn rolling_mean(values: &[f64], window: usize) -> Vec<Option<f64>> {
        let window = window.max(1);
        let mut out = Vec::with_capacity(values.len());

        for i in 0..values.len() {
            if i + 1 < window {
                out.push(None);
                continue;
            }
            let slice = &values[i + 1 - window..=i];
            let mean = slice.iter().sum::<f64>() / window as f64;
            out.push(mean.is_finite().then_some(mean));
        }

        out
    }

    /// Mean of `points` per fixed-width time bucket.
    ///
    /// Bucket starts are aligned to absolute clock boundaries, so hourly
    /// buckets begin on the hour regardless of when the data starts. Only
    /// buckets that received at least one finite value appear; gaps stay
    /// absent rather than being zero-filled.
    pub fn resample(points: &[(DateTime<Utc>, f64)], interval: TimeDelta) -> Vec<ResampledPoint> {
        // BTreeMap keeps the buckets chronologically sorted.
        let mut buckets: BTreeMap<DateTime<Utc>, (f64, usize)> = BTreeMap::new();

        for &(timestamp, value) in points {
            if !value.is_finite() {
                continue;
            }
            let bucket = floor_to_interval(timestamp, interval);
            let entry = buckets.entry(bucket).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }

        buckets
            .into_iter()
            .map(|(bucket_start, (sum, count))| ResampledPoint {
                bucket_start,
                mean: sum / count as f64,
                count,
            })
            .collect()
    }

    /// Smoothed and resampled views of `variable`, one [`StateSeries`] per
    /// operating state in order of first appearance.
    ///
    /// Each state's samples form their own sequence: rolling windows never
    /// straddle a state boundary, and buckets only aggregate samples of
    /// their own state.
    pub fn by_state(
        series: &EntityTimeSeries,
        variable: Variable,
        options: &AnalysisOptions,
    ) -> Vec<StateSeries> {
        let mut out = Vec::new();

        for state in Self::observed_states(series) {
            let mut timestamps: Vec<DateTime<Utc>> = Vec::new();
            let mut values: Vec<f64> = Vec::new();
            for (index, sample) in series.samples.iter().enumerate() {
                if sample.state != state {
                    continue;
                }
                timestamps.push(sample.timestamp);
                values.push(series.value_at(variable, index).unwrap_or(f64::NAN));
            }

            let smoothed = Self::rolling_mean(&values, options.rolling_window)
                .into_iter()
                .zip(timestamps.iter())
                .map(|(value, &timestamp)| SmoothedPoint { timestamp, value })
                .collect();

            let paired: Vec<(DateTime<Utc>, f64)> = timestamps
                .iter()
                .copied()
                .zip(values.iter().copied())
                .collect();
            let hourly = Self::resample(&paired, options.resample_interval);

            out.push(StateSeries {
                entity_id: series.entity_id.clone(),
                state,
                variable,
                smoothed,
                hourly,
            });
        }

        out
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
