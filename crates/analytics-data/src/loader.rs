//! Per-entity telemetry loading.
//!
//! Each CSV file holds the telemetry of exactly one entity; the entity id
//! is taken from the first sampled row. Files are folded into an
//! [`EntityMap`] under a configurable duplicate-id policy.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use analytics_core::error::{AnalyticsError, Result};
use analytics_core::models::{EntityTimeSeries, MergePolicy, TelemetrySample};
use analytics_core::settings::AnalysisOptions;
use analytics_core::time_utils::TimezoneHandler;

use crate::chunk::{ChunkedCsvReader, HeaderIndex};

/// Header names accepted for the entity id column, in priority order.
const ID_COLUMNS: &[&str] = &["scooter_id", "vehicle_id", "entity_id"];

// ── ColumnLayout ──────────────────────────────────────────────────────────────

/// Column positions resolved once per file from the header.
#[derive(Debug, Clone, Copy)]
struct ColumnLayout {
    entity_id: usize,
    timestamp: usize,
    speed: usize,
    acceleration: usize,
    wheel_rotation: usize,
    battery_level: usize,
    state: usize,
}

impl ColumnLayout {
    fn resolve(header: &HeaderIndex, path: &Path) -> Result<Self> {
        let require = |name: &str| {
            header
                .position(name)
                .ok_or_else(|| AnalyticsError::MissingColumn {
                    path: path.to_path_buf(),
                    column: name.to_string(),
                })
        };

        Ok(Self {
            entity_id: header.position_of_any(ID_COLUMNS).ok_or_else(|| {
                AnalyticsError::MissingColumn {
                    path: path.to_path_buf(),
                    column: ID_COLUMNS[0].to_string(),
                }
            })?,
            timestamp: require("timestamp")?,
            speed: require("speed")?,
            acceleration: require("acceleration")?,
            wheel_rotation: require("wheel_rotation")?,
            battery_level: require("battery_level")?,
            state: require("state")?,
        })
    }
}

// ── EntityMap ─────────────────────────────────────────────────────────────────

/// All loaded entities, keyed by id.
///
/// Serves as the shared context object of a run; every downstream stage
/// receives it (or series drawn from it) explicitly.
#[derive(Debug, Default)]
pub struct EntityMap {
    entities: BTreeMap<String, EntityTimeSeries>,
}

impl EntityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn get(&self, entity_id: &str) -> Option<&EntityTimeSeries> {
        self.entities.get(entity_id)
    }

    /// Entity ids in sorted order.
    pub fn entity_ids(&self) -> Vec<String> {
        self.entities.keys().cloned().collect()
    }

    /// Mutable access to every series, e.g. for temperature attachment.
    pub fn series_mut(&mut self) -> impl Iterator<Item = &mut EntityTimeSeries> {
        self.entities.values_mut()
    }

    /// Consume the map, yielding the series in id order.
    pub fn into_series(self) -> impl Iterator<Item = EntityTimeSeries> {
        self.entities.into_values()
    }

    /// Insert `series` under the given duplicate policy.
    pub fn merge(&mut self, series: EntityTimeSeries, policy: MergePolicy) -> Result<()> {
        match self.entities.entry(series.entity_id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(series);
            }
            Entry::Occupied(mut slot) => match policy {
                MergePolicy::Replace => {
                    warn!(
                        "Entity {} loaded again; replacing {} earlier samples with {}",
                        series.entity_id,
                        slot.get().len(),
                        series.len()
                    );
                    slot.insert(series);
                }
                MergePolicy::Error => {
                    return Err(AnalyticsError::DuplicateEntity(series.entity_id));
                }
                MergePolicy::Append => {
                    let existing = slot.get_mut();
                    existing.samples.extend(series.samples);
                    existing.sort_by_timestamp();
                    // An attached temperature column no longer lines up with
                    // the merged samples; drop it for re-attachment.
                    existing.temperature = None;
                }
            },
        }
        Ok(())
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Load one telemetry CSV into a per-entity time series.
///
/// Rows are consumed in blocks of `options.block_size` raw rows and
/// subsampled at `options.sample_stride` within each block. The entity id
/// comes from the first sampled row and stands for the whole file; later
/// rows are not re-checked against it. Samples are sorted by timestamp
/// before returning. A header-only file yields an empty series.
pub fn load_entity_file(
    path: &Path,
    options: &AnalysisOptions,
    timezone: &TimezoneHandler,
) -> Result<EntityTimeSeries> {
    let reader = ChunkedCsvReader::open(path, options.block_size, options.sample_stride)?;
    let layout = ColumnLayout::resolve(reader.header(), path)?;

    let mut series = EntityTimeSeries::new("");
    let mut blocks = 0usize;
    let mut raw_rows = 0usize;

    for block in reader {
        let block = block?;
        blocks += 1;
        raw_rows += block.raw_len;
        for row in &block.rows {
            let sample = parse_row(row, layout, path, timezone)?;
            if series.entity_id.is_empty() {
                series.entity_id = sample.entity_id.clone();
            }
            series.samples.push(sample);
        }
    }

    series.sort_by_timestamp();

    debug!(
        "Loaded {}: kept {} of {} raw rows across {} blocks",
        path.display(),
        series.len(),
        raw_rows,
        blocks
    );

    Ok(series)
}

/// Load every file sequentially into an [`EntityMap`].
///
/// The first fatal error aborts the run. Files whose sampled row set is
/// empty are skipped with a warning rather than producing a phantom entity.
pub fn load_files(
    paths: &[PathBuf],
    options: &AnalysisOptions,
    timezone: &TimezoneHandler,
) -> Result<EntityMap> {
    let mut entities = EntityMap::new();

    for path in paths {
        let series = load_entity_file(path, options, timezone)?;
        if series.is_empty() {
            warn!("No rows sampled from {}; skipping", path.display());
            continue;
        }
        entities.merge(series, options.merge_policy)?;
    }

    debug!(
        "Loaded {} entities from {} files",
        entities.len(),
        paths.len()
    );

    Ok(entities)
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Decode one sampled CSV row into a typed sample.
fn parse_row(
    row: &csv::StringRecord,
    layout: ColumnLayout,
    path: &Path,
    timezone: &TimezoneHandler,
) -> Result<TelemetrySample> {
    let line = row.position().map(|p| p.line()).unwrap_or(0);
    let field = |index: usize| row.get(index).unwrap_or("");

    let raw_ts = field(layout.timestamp);
    let timestamp =
        timezone
            .parse_timestamp(raw_ts)
            .ok_or_else(|| AnalyticsError::Timestamp {
                path: path.to_path_buf(),
                line,
                value: raw_ts.to_string(),
            })?;

    Ok(TelemetrySample {
        entity_id: field(layout.entity_id).to_string(),
        timestamp,
        speed: parse_float(field(layout.speed), "speed", path, line)?,
        acceleration: parse_float(field(layout.acceleration), "acceleration", path, line)?,
        wheel_rotation: parse_float(field(layout.wheel_rotation), "wheel_rotation", path, line)?,
        battery_level: parse_float(field(layout.battery_level), "battery_level", path, line)?,
        state: field(layout.state).to_string(),
    })
}

/// Parse a numeric cell. Empty cells are missing values (NaN); a non-empty
/// cell that fails to parse is a hard error.
fn parse_float(raw: &str, column: &str, path: &Path, line: u64) -> Result<f64> {
    if raw.is_empty() {
        return Ok(f64::NAN);
    }
    raw.parse::<f64>()
        .map_err(|_| AnalyticsError::InvalidNumber {
            path: path.to_path_buf(),
            line,
            column: column.to_string(),
            value: raw.to_string(),
        })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
