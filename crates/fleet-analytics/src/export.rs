//! Report export.
//!
//! Turns finished [`EntityReport`]s into CSV series files plus a JSON run
//! manifest. The pipeline core produces numbers only; every naming and
//! formatting decision lives here.

use std::path::{Path, PathBuf};

use analytics_core::error::{AnalyticsError, Result};
use analytics_core::models::{BinnedSeries, StateSeries};
use analytics_data::analysis::EntityReport;
use serde::Serialize;
use tracing::debug;

// ── RunSummary ────────────────────────────────────────────────────────────────

/// Fleet-level run statistics written to `run_manifest.json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// ISO-8601 timestamp when the run finished.
    pub generated_at: String,
    /// Telemetry files ingested.
    pub files_processed: usize,
    /// Entities that produced at least one sampled row.
    pub entities: usize,
    /// CSV series files written across all entities.
    pub series_written: usize,
    /// Wall-clock seconds spent loading and sampling input files.
    pub load_time_seconds: f64,
    /// Wall-clock seconds spent analysing entities and writing reports.
    pub aggregate_time_seconds: f64,
}

// ── SeriesWriter ──────────────────────────────────────────────────────────────

/// Writes the CSV series of entity reports into one output directory.
///
/// File names are `{entity}_{series}.csv` with entity and state names
/// sanitised for the filesystem:
/// - `{entity}_braking_by_speed.csv`
/// - `{entity}_energy_by_battery.csv`
/// - `{entity}_{variable}_{state}_smoothed.csv` and `_hourly.csv`
/// - `{entity}_{value}_by_temperature.csv`
pub struct SeriesWriter {
    output_dir: PathBuf,
}

impl SeriesWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Write every series of `report`; returns the number of files written.
    pub fn write_entity(&self, report: &EntityReport) -> Result<usize> {
        let entity = sanitize(&report.entity_id);
        let mut written = 0;

        self.write_binned(&entity, "braking_by_speed", &report.braking_by_speed)?;
        written += 1;
        self.write_binned(&entity, "energy_by_battery", &report.energy_by_battery)?;
        written += 1;

        for series in &report.battery_by_state {
            self.write_smoothed(&entity, series)?;
            self.write_hourly(&entity, series)?;
            written += 2;
        }

        for series in &report.temperature {
            let name = format!("{}_by_temperature", series.value.name());
            self.write_binned(&entity, &name, series)?;
            written += 1;
        }

        debug!("Wrote {} series files for {}", written, report.entity_id);
        Ok(written)
    }

    /// Serialise the run summary to `run_manifest.json`.
    pub fn write_manifest(&self, summary: &RunSummary) -> Result<PathBuf> {
        let path = self.output_dir.join("run_manifest.json");
        let json = serde_json::to_string_pretty(summary)?;

        // Write to a temp file then rename, like the settings store.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, &path)?;

        Ok(path)
    }

    // ── Per-format writers ────────────────────────────────────────────────

    fn write_binned(&self, entity: &str, name: &str, series: &BinnedSeries) -> Result<()> {
        let path = self.output_dir.join(format!("{entity}_{name}.csv"));
        let mut writer = csv::Writer::from_path(&path).map_err(|e| write_error(&path, e))?;

        writer
            .write_record(["bin_index", "bin_lo", "bin_hi", "mean", "count"])
            .map_err(|e| write_error(&path, e))?;
        for bin in &series.bins {
            writer
                .write_record([
                    bin.index.to_string(),
                    format_float(bin.lo),
                    format_float(bin.hi),
                    format_float(bin.mean),
                    bin.count.to_string(),
                ])
                .map_err(|e| write_error(&path, e))?;
        }

        flush(writer, &path)
    }

    fn write_smoothed(&self, entity: &str, series: &StateSeries) -> Result<()> {
        let path = self.output_dir.join(format!(
            "{entity}_{}_{}_smoothed.csv",
            series.variable.name(),
            sanitize(&series.state)
        ));
        let mut writer = csv::Writer::from_path(&path).map_err(|e| write_error(&path, e))?;

        writer
            .write_record(["timestamp", "smoothed"])
            .map_err(|e| write_error(&path, e))?;
        for point in &series.smoothed {
            // A missing rolling mean stays a missing cell, not a zero.
            let value = point.value.map(format_float).unwrap_or_default();
            writer
                .write_record([point.timestamp.to_rfc3339(), value])
                .map_err(|e| write_error(&path, e))?;
        }

        flush(writer, &path)
    }

    fn write_hourly(&self, entity: &str, series: &StateSeries) -> Result<()> {
        let path = self.output_dir.join(format!(
            "{entity}_{}_{}_hourly.csv",
            series.variable.name(),
            sanitize(&series.state)
        ));
        let mut writer = csv::Writer::from_path(&path).map_err(|e| write_error(&path, e))?;

        writer
            .write_record(["bucket_start", "mean", "count"])
            .map_err(|e| write_error(&path, e))?;
        for point in &series.hourly {
            writer
                .write_record([
                    point.bucket_start.to_rfc3339(),
                    format_float(point.mean),
                    point.count.to_string(),
                ])
                .map_err(|e| write_error(&path, e))?;
        }

        flush(writer, &path)
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Flush and classify any buffered-write failure against `path`.
fn flush(mut writer: csv::Writer<std::fs::File>, path: &Path) -> Result<()> {
    writer.flush().map_err(|source| AnalyticsError::FileWrite {
        path: path.to_path_buf(),
        source,
    })
}

/// Classify a csv-layer error against the file being written.
fn write_error(path: &Path, err: csv::Error) -> AnalyticsError {
    let message = err.to_string();
    match err.into_kind() {
        csv::ErrorKind::Io(source) => AnalyticsError::FileWrite {
            path: path.to_path_buf(),
            source,
        },
        _ => AnalyticsError::Csv {
            path: path.to_path_buf(),
            message,
        },
    }
}

/// Make an entity or state name safe for use inside a file name.
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.chars().all(|c| c == '-') {
        "unknown".to_string()
    } else {
        cleaned
    }
}

/// Render a float cell; non-finite values become an empty cell.
fn format_float(value: f64) -> String {
    if value.is_finite() {
        value.to_string()
    } else {
        String::new()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use analytics_core::models::{EntityTimeSeries, TelemetrySample};
    use analytics_core::settings::AnalysisOptions;
    use analytics_data::analysis::analyze_entity;
    use chrono::{TimeZone as _, Utc};
    use tempfile::TempDir;

    // ── helpers ───────────────────────────────────────────────────────────────

    fn sample(
        minute: u32,
        speed: f64,
        acceleration: f64,
        battery: f64,
        state: &str,
    ) -> TelemetrySample {
        TelemetrySample {
            entity_id: "Scooter 7".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 6, 15, 10, minute, 0).unwrap(),
            speed,
            acceleration,
            wheel_rotation: 95.0,
            battery_level: battery,
            state: state.to_string(),
        }
    }

    /// Four samples across two states, with a temperature column attached.
    fn report() -> EntityReport {
        let series = EntityTimeSeries {
            entity_id: "Scooter 7".to_string(),
            samples: vec![
                sample(0, 18.0, 0.4, 82.0, "riding"),
                sample(1, 22.0, -1.2, 81.0, "riding"),
                sample(2, 15.0, -0.6, 80.5, "riding"),
                sample(3, 0.0, 0.0, 80.5, "idle"),
            ],
            temperature: Some(vec![12.0, 13.0, 14.0, 15.0]),
        };
        analyze_entity(&series, &AnalysisOptions::default())
    }

    fn read_rows(path: &Path) -> (csv::StringRecord, Vec<csv::StringRecord>) {
        let mut reader = csv::Reader::from_path(path).expect("open written file");
        let headers = reader.headers().expect("headers").clone();
        let rows = reader.records().map(|r| r.expect("row")).collect();
        (headers, rows)
    }

    // ── write_entity ──────────────────────────────────────────────────────────

    #[test]
    fn test_write_entity_produces_full_file_set() {
        let tmp = TempDir::new().expect("tempdir");
        let writer = SeriesWriter::new(tmp.path());

        let written = writer.write_entity(&report()).expect("write");
        assert_eq!(written, 10);

        for name in [
            "scooter-7_braking_by_speed.csv",
            "scooter-7_energy_by_battery.csv",
            "scooter-7_battery_level_riding_smoothed.csv",
            "scooter-7_battery_level_riding_hourly.csv",
            "scooter-7_battery_level_idle_smoothed.csv",
            "scooter-7_battery_level_idle_hourly.csv",
            "scooter-7_acceleration_by_temperature.csv",
            "scooter-7_battery_level_by_temperature.csv",
            "scooter-7_energy_impact_by_temperature.csv",
            "scooter-7_battery_efficiency_by_temperature.csv",
        ] {
            assert!(tmp.path().join(name).is_file(), "missing {}", name);
        }
    }

    #[test]
    fn test_binned_file_columns() {
        let tmp = TempDir::new().expect("tempdir");
        let writer = SeriesWriter::new(tmp.path());
        writer.write_entity(&report()).expect("write");

        let (headers, rows) = read_rows(&tmp.path().join("scooter-7_braking_by_speed.csv"));
        assert_eq!(
            headers,
            csv::StringRecord::from(vec!["bin_index", "bin_lo", "bin_hi", "mean", "count"])
        );

        // Two braking rows: speed 15 lands in bin 0, speed 22 in the last bin.
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "0");
        assert_eq!(&rows[0][3], "-0.6");
        assert_eq!(&rows[0][4], "1");
        assert_eq!(&rows[1][0], "9");
        assert_eq!(&rows[1][3], "-1.2");

        // Edges come back as parseable floats spanning the braking speed range.
        let lo: f64 = rows[0][1].parse().expect("bin_lo");
        let hi: f64 = rows[1][2].parse().expect("bin_hi");
        assert!((lo - 15.0).abs() < 1e-9);
        assert!((hi - 22.0).abs() < 1e-9);
    }

    #[test]
    fn test_smoothed_file_keeps_missing_cells_empty() {
        let tmp = TempDir::new().expect("tempdir");
        let writer = SeriesWriter::new(tmp.path());
        writer.write_entity(&report()).expect("write");

        let (headers, rows) =
            read_rows(&tmp.path().join("scooter-7_battery_level_riding_smoothed.csv"));
        assert_eq!(headers, csv::StringRecord::from(vec!["timestamp", "smoothed"]));

        // Three riding samples against the default window of 20: every rolling
        // mean is still warming up, so every cell is empty.
        assert_eq!(rows.len(), 3);
        assert_eq!(&rows[0][0], "2024-06-15T10:00:00+00:00");
        for row in &rows {
            assert_eq!(&row[1], "");
        }
    }

    #[test]
    fn test_hourly_file_columns() {
        let tmp = TempDir::new().expect("tempdir");
        let writer = SeriesWriter::new(tmp.path());
        writer.write_entity(&report()).expect("write");

        let (headers, rows) =
            read_rows(&tmp.path().join("scooter-7_battery_level_riding_hourly.csv"));
        assert_eq!(
            headers,
            csv::StringRecord::from(vec!["bucket_start", "mean", "count"])
        );

        // All riding samples fall inside one clock hour.
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][0], "2024-06-15T10:00:00+00:00");
        let mean: f64 = rows[0][1].parse().expect("mean");
        assert!((mean - (82.0 + 81.0 + 80.5) / 3.0).abs() < 1e-9);
        assert_eq!(&rows[0][2], "3");
    }

    #[test]
    fn test_write_error_names_the_file() {
        let tmp = TempDir::new().expect("tempdir");
        let writer = SeriesWriter::new(tmp.path().join("no_such_dir"));

        let err = writer.write_entity(&report()).unwrap_err();
        match err {
            AnalyticsError::FileWrite { path, .. } => {
                assert!(path.starts_with(tmp.path().join("no_such_dir")));
            }
            other => panic!("expected FileWrite, got {other:?}"),
        }
    }

    // ── write_manifest ────────────────────────────────────────────────────────

    #[test]
    fn test_manifest_round_trip() {
        let tmp = TempDir::new().expect("tempdir");
        let writer = SeriesWriter::new(tmp.path());

        let summary = RunSummary {
            generated_at: "2024-06-15T12:00:00+00:00".to_string(),
            files_processed: 3,
            entities: 2,
            series_written: 12,
            load_time_seconds: 0.8,
            aggregate_time_seconds: 0.2,
        };
        let path = writer.write_manifest(&summary).expect("manifest");
        assert_eq!(path, tmp.path().join("run_manifest.json"));

        let content = std::fs::read_to_string(&path).expect("read manifest");
        let value: serde_json::Value = serde_json::from_str(&content).expect("parse");
        assert_eq!(value["files_processed"], 3);
        assert_eq!(value["entities"], 2);
        assert_eq!(value["series_written"], 12);
        assert_eq!(value["generated_at"], "2024-06-15T12:00:00+00:00");
    }

    // ── helpers ───────────────────────────────────────────────────────────────

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("Scooter 7"), "scooter-7");
        assert_eq!(sanitize("riding"), "riding");
        assert_eq!(sanitize("low_battery"), "low-battery");
        assert_eq!(sanitize(""), "unknown");
        assert_eq!(sanitize("___"), "unknown");
    }

    #[test]
    fn test_format_float() {
        assert_eq!(format_float(1.5), "1.5");
        assert_eq!(format_float(-0.6), "-0.6");
        assert_eq!(format_float(f64::NAN), "");
        assert_eq!(format_float(f64::INFINITY), "");
    }
}
