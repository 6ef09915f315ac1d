use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::AnalyticsError;

/// Determines what happens when two files resolve to the same entity id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergePolicy {
    /// Keep the most recently loaded series and discard the earlier one.
    Replace,
    /// Treat the duplicate id as a fatal error.
    Error,
    /// Concatenate the new samples onto the existing series, re-sorted by time.
    Append,
}

impl FromStr for MergePolicy {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "replace" => Ok(Self::Replace),
            "error" => Ok(Self::Error),
            "append" => Ok(Self::Append),
            other => Err(AnalyticsError::Config(format!(
                "unknown merge policy '{other}', expected replace, error or append"
            ))),
        }
    }
}

/// One telemetry reading decoded from a CSV row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Entity id carried on the row itself.
    pub entity_id: String,
    /// UTC timestamp of the reading.
    pub timestamp: DateTime<Utc>,
    /// Ground speed in km/h.
    pub speed: f64,
    /// Longitudinal acceleration in m/s^2; negative while braking.
    pub acceleration: f64,
    /// Wheel rotation rate in rpm.
    pub wheel_rotation: f64,
    /// Battery charge percentage, 0-100.
    pub battery_level: f64,
    /// Discrete operating state label, e.g. "riding" or "idle".
    pub state: String,
}

/// Selects one column, direct or derived, of an entity's time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variable {
    Speed,
    Acceleration,
    WheelRotation,
    BatteryLevel,
    /// Magnitude of acceleration, used as a proxy for instantaneous
    /// energy demand.
    EnergyImpact,
    /// Ambient temperature attached by a temperature provider.
    Temperature,
    /// First difference of battery level per unit of speed.
    BatteryEfficiency,
}

impl Variable {
    /// Stable lowercase name used in report columns and output file names.
    ///
    /// # Examples
    ///
    /// ```
    /// use analytics_core::models::Variable;
    ///
    /// assert_eq!(Variable::BatteryLevel.name(), "battery_level");
    /// assert_eq!(Variable::EnergyImpact.name(), "energy_impact");
    /// ```
    pub fn name(&self) -> &'static str {
        match self {
            Self::Speed => "speed",
            Self::Acceleration => "acceleration",
            Self::WheelRotation => "wheel_rotation",
            Self::BatteryLevel => "battery_level",
            Self::EnergyImpact => "energy_impact",
            Self::Temperature => "temperature",
            Self::BatteryEfficiency => "battery_efficiency",
        }
    }
}

/// All samples loaded for a single entity, ordered by timestamp.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityTimeSeries {
    /// Entity id taken from the first sampled row of the source file.
    pub entity_id: String,
    /// Timestamp-ordered samples.
    #[serde(default)]
    pub samples: Vec<TelemetrySample>,
    /// Ambient temperature aligned index-for-index with `samples`, present
    /// only after a temperature provider has been attached.
    #[serde(default)]
    pub temperature: Option<Vec<f64>>,
}

impl EntityTimeSeries {
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            samples: Vec::new(),
            temperature: None,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Re-orders samples chronologically; equal timestamps keep load order.
    pub fn sort_by_timestamp(&mut self) {
        self.samples.sort_by_key(|s| s.timestamp);
    }

    /// Value of `variable` at `index`, or `None` when the value is missing.
    ///
    /// Direct variables read the sample's own column. `EnergyImpact` is the
    /// magnitude of acceleration, `Temperature` reads the attached column,
    /// and `BatteryEfficiency` is the battery delta against the previous
    /// sample divided by speed (offset by 0.1 so stationary readings stay
    /// finite); the first sample has no previous reading and is missing.
    /// Non-finite values are reported as missing.
    pub fn value_at(&self, variable: Variable, index: usize) -> Option<f64> {
        let sample = self.samples.get(index)?;
        let value = match variable {
            Variable::Speed => sample.speed,
            Variable::Acceleration => sample.acceleration,
            Variable::WheelRotation => sample.wheel_rotation,
            Variable::BatteryLevel => sample.battery_level,
            Variable::EnergyImpact => sample.acceleration.abs(),
            Variable::Temperature => *self.temperature.as_ref()?.get(index)?,
            Variable::BatteryEfficiency => {
                let prev = self.samples.get(index.checked_sub(1)?)?;
                (sample.battery_level - prev.battery_level) / (sample.speed + 0.1)
            }
        };
        value.is_finite().then_some(value)
    }
}

/// One populated bin of a binned-mean series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bin {
    /// Ordinal position in the full bin grid, 0-based.
    pub index: usize,
    /// Inclusive lower edge.
    pub lo: f64,
    /// Upper edge; exclusive except on the last bin of the grid.
    pub hi: f64,
    /// Unweighted mean of the value variable over samples in this bin.
    pub mean: f64,
    /// Number of samples behind `mean`.
    pub count: usize,
}

/// Mean of a value variable grouped into equal-width bins of a key variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinnedSeries {
    pub entity_id: String,
    /// Variable whose range was divided into bins.
    pub key: Variable,
    /// Variable averaged inside each bin.
    pub value: Variable,
    /// Width of the full bin grid; empty bins are omitted from `bins` but
    /// keep their ordinal index.
    pub bin_count: usize,
    #[serde(default)]
    pub bins: Vec<Bin>,
}

/// Mean of a variable over one fixed-width time bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResampledPoint {
    /// Inclusive start of the bucket, aligned to absolute clock boundaries.
    pub bucket_start: DateTime<Utc>,
    /// Mean of the non-missing values falling in the bucket.
    pub mean: f64,
    /// Number of values behind `mean`.
    pub count: usize,
}

/// One output point of a rolling-mean pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothedPoint {
    /// Timestamp of the underlying sample.
    pub timestamp: DateTime<Utc>,
    /// Rolling mean ending at this sample; `None` until a full window exists.
    pub value: Option<f64>,
}

/// Temporal aggregates of one variable restricted to one operating state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSeries {
    pub entity_id: String,
    /// Operating state this partition covers.
    pub state: String,
    /// Variable the aggregates were computed over.
    pub variable: Variable,
    /// Rolling mean over the state's samples in time order.
    #[serde(default)]
    pub smoothed: Vec<SmoothedPoint>,
    /// Interval means over the state's samples, sparse where no data fell.
    #[serde(default)]
    pub hourly: Vec<ResampledPoint>,
}
