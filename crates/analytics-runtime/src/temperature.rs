//! Ambient-temperature synthesis.
//!
//! Fleets recorded without a temperature sensor can still run the
//! temperature correlation reports: [`attach_temperature`] fills the
//! optional temperature column of a series from a [`TemperatureProvider`],
//! and [`SimulatedClimate`] is the built-in provider that reconstructs a
//! plausible northern-European climate from each sample's timestamp.

use analytics_core::models::EntityTimeSeries;
use chrono::{DateTime, Datelike, Timelike, Utc};
use std::f64::consts::TAU;

/// Fleet-wide mean ambient temperature in degrees Celsius.
const BASE_C: f64 = 10.0;
/// Seasonal swing around the base, peaking near midsummer.
const SEASONAL_AMPLITUDE_C: f64 = 10.0;
/// Day-night swing, warmest around 20:00.
const DIURNAL_AMPLITUDE_C: f64 = 5.0;
/// Standard deviation of the per-sample noise.
const NOISE_SIGMA_C: f64 = 2.0;
/// Simulated temperatures are clamped to this range.
const MIN_C: f64 = 0.0;
const MAX_C: f64 = 20.0;

// ── TemperatureProvider ───────────────────────────────────────────────────────

/// A source of ambient temperatures for a list of sample timestamps.
///
/// Implementations must return exactly one value per timestamp, in order.
pub trait TemperatureProvider {
    fn temperatures(&self, timestamps: &[DateTime<Utc>]) -> Vec<f64>;
}

/// Attach a temperature column to `series`, one value per sample.
///
/// Replaces any previously attached column.
pub fn attach_temperature(series: &mut EntityTimeSeries, provider: &dyn TemperatureProvider) {
    let timestamps: Vec<DateTime<Utc>> = series.samples.iter().map(|s| s.timestamp).collect();
    series.temperature = Some(provider.temperatures(&timestamps));
}

// ── SimulatedClimate ──────────────────────────────────────────────────────────

/// Deterministic climate simulator.
///
/// Each temperature is a seasonal sine over the day of year plus a diurnal
/// sine over the hour of day plus seeded noise, clamped to `[0, 20]` °C.
/// The same seed and timestamps always produce the same column.
pub struct SimulatedClimate {
    seed: u64,
}

impl SimulatedClimate {
    pub const DEFAULT_SEED: u64 = 4;

    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl Default for SimulatedClimate {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SEED)
    }
}

impl TemperatureProvider for SimulatedClimate {
    fn temperatures(&self, timestamps: &[DateTime<Utc>]) -> Vec<f64> {
        // Fresh noise stream per call so repeated attachment is reproducible.
        let mut noise = NoiseSource::new(self.seed);
        timestamps
            .iter()
            .map(|ts| simulate(&mut noise, ts))
            .collect()
    }
}

/// One simulated reading for one timestamp.
fn simulate(noise: &mut NoiseSource, ts: &DateTime<Utc>) -> f64 {
    let seasonal = SEASONAL_AMPLITUDE_C * (TAU * (f64::from(ts.ordinal()) - 80.0) / 365.0).sin();
    let diurnal = DIURNAL_AMPLITUDE_C * (TAU * (f64::from(ts.hour()) - 14.0) / 24.0).sin();
    let value = BASE_C + seasonal + diurnal + noise.gaussian() * NOISE_SIGMA_C;
    value.clamp(MIN_C, MAX_C)
}

// ── NoiseSource ───────────────────────────────────────────────────────────────

/// Seeded pseudo-random noise, self-contained so the column is reproducible
/// across platforms.
struct NoiseSource {
    lfsr: u16,
}

impl NoiseSource {
    fn new(seed: u64) -> Self {
        // Fold the 64-bit seed down to the 16-bit register; the all-zero
        // state is a fixed point of the shift register, so remap it.
        let folded = (seed ^ (seed >> 16) ^ (seed >> 32) ^ (seed >> 48)) as u16;
        Self {
            lfsr: if folded == 0 { 0xACE1 } else { folded },
        }
    }

    /// Next uniform draw in `[0, 1)`.
    fn uniform(&mut self) -> f64 {
        // 16-bit Fibonacci LFSR, taps 16/14/13/11.
        let bit = (self.lfsr ^ (self.lfsr >> 2) ^ (self.lfsr >> 3) ^ (self.lfsr >> 5)) & 1;
        self.lfsr = (self.lfsr >> 1) | (bit << 15);
        f64::from(self.lfsr) / 65536.0
    }

    /// Approximate standard normal draw: Irwin-Hall sum of twelve uniforms.
    fn gaussian(&mut self) -> f64 {
        (0..12).map(|_| self.uniform()).sum::<f64>() - 6.0
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
