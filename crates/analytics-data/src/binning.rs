//! Binned correlation between telemetry variables.
//!
//! Answers questions of the form "how does braking intensity vary with
//! speed": rows are optionally filtered, the key variable's observed range
//! is divided into equal-width bins, and the value variable is averaged
//! inside each bin.

use tracing::debug;

use analytics_core::models::{Bin, BinnedSeries, EntityTimeSeries, TelemetrySample, Variable};

// ── Row filters ───────────────────────────────────────────────────────────────

/// Row predicate applied before any binning.
pub type SampleFilter = fn(&TelemetrySample) -> bool;

/// Keep rows with positive acceleration.
pub fn is_accelerating(sample: &TelemetrySample) -> bool {
    sample.acceleration > 0.0
}

/// Keep rows with negative acceleration.
pub fn is_braking(sample: &TelemetrySample) -> bool {
    sample.acceleration < 0.0
}

// ── BinnedCorrelation ─────────────────────────────────────────────────────────

/// Stateless helper computing binned means.
pub struct BinnedCorrelation;

impl BinnedCorrelation {
    /// Mean of `value` inside `bin_count` equal-width bins of `key`.
    ///
    /// The optional `filter` runs first, and the bin range spans exactly the
    /// filtered rows. Bins are half-open `[lo, hi)` except the last, which
    /// also includes its right edge. Bins that received no samples are
    /// omitted while the remaining bins keep their ordinal index. Rows with
    /// a missing key are ignored entirely; rows with a present key but a
    /// missing value widen the range without contributing to any mean.
    pub fn binned_mean(
        series: &EntityTimeSeries,
        key: Variable,
        value: Variable,
        filter: Option<SampleFilter>,
        bin_count: usize,
    ) -> BinnedSeries {
        let bin_count = bin_count.max(1);

        let mut pairs: Vec<(f64, Option<f64>)> = Vec::new();
        for (index, sample) in series.samples.iter().enumerate() {
            if let Some(keep) = filter {
                if !keep(sample) {
                    continue;
                }
            }
            if let Some(key_value) = series.value_at(key, index) {
                pairs.push((key_value, series.value_at(value, index)));
            }
        }

        if pairs.is_empty() {
            debug!(
                "Entity {}: no rows left for {} by {}",
                series.entity_id,
                value.name(),
                key.name()
            );
            return BinnedSeries {
                entity_id: series.entity_id.clone(),
                key,
                value,
                bin_count,
                bins: Vec::new(),
            };
        }

        let min = pairs.iter().fold(f64::INFINITY, |acc, &(k, _)| acc.min(k));
        let max = pairs
            .iter()
            .fold(f64::NEG_INFINITY, |acc, &(k, _)| acc.max(k));
        let width = (max - min) / bin_count as f64;

        let mut sums = vec![0.0f64; bin_count];
        let mut counts = vec![0usize; bin_count];
        for &(key_value, maybe_value) in &pairs {
            if let Some(v) = maybe_value {
                let index = bin_index(key_value, min, max, width, bin_count);
                sums[index] += v;
                counts[index] += 1;
            }
        }

        let bins = (0..bin_count)
            .filter(|&i| counts[i] > 0)
            .map(|i| Bin {
                index: i,
                lo: min + width * i as f64,
                hi: min + width * (i + 1) as f64,
                mean: sums[i] / counts[i] as f64,
                count: counts[i],
            })
            .collect();

        BinnedSeries {
            entity_id: series.entity_id.clone(),
            key,
            value,
            bin_count,
            bins,
        }
    }
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Map a key value onto its bin index.
///
/// Keys at the top of the range land in the last bin (closed right edge);
/// a degenerate range (`min == max`, width zero) puts everything there too.
fn bin_index(key: f64, min: f64, max: f64, width: f64, bin_count: usize) -> usize {
    if key >= max {
        return bin_count - 1;
    }
    (((key - min) / width) as usize).min(bin_count - 1)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
