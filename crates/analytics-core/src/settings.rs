use chrono::TimeDelta;
use clap::{CommandFactory, Parser};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;
use crate::models::MergePolicy;

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Telemetry ingestion and aggregation for scooter fleets
#[derive(Parser, Debug, Clone)]
#[command(
    name = "fleet-analytics",
    about = "Telemetry ingestion and aggregation for scooter fleets",
    version
)]
pub struct Settings {
    /// Telemetry CSV files, one per entity
    #[arg(value_name = "FILE")]
    pub inputs: Vec<PathBuf>,

    /// Directory to scan recursively for telemetry CSV files
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Directory where reports and the run manifest are written
    #[arg(long, default_value = "analysis_output")]
    pub output_dir: PathBuf,

    /// Rows read per block before subsampling
    #[arg(long, default_value = "100000", value_parser = clap::value_parser!(u64).range(1..))]
    pub block_size: u64,

    /// Keep every N-th row of each block
    #[arg(long, default_value = "100", value_parser = clap::value_parser!(u64).range(1..))]
    pub sample_stride: u64,

    /// Rolling mean window in samples
    #[arg(long, default_value = "20", value_parser = clap::value_parser!(u32).range(1..))]
    pub rolling_window: u32,

    /// Resample interval in hours (1-24)
    #[arg(long, default_value = "1", value_parser = clap::value_parser!(u32).range(1..=24))]
    pub resample_hours: u32,

    /// Number of equal-width bins for correlation reports
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u32).range(1..))]
    pub bin_count: u32,

    /// What to do when two files resolve to the same entity id
    #[arg(long, default_value = "replace", value_parser = ["replace", "error", "append"])]
    pub merge_policy: String,

    /// Timezone for naive timestamps (auto-detected if not specified)
    #[arg(long, default_value = "auto")]
    pub timezone: String,

    /// Attach simulated ambient temperature and run temperature reports
    #[arg(long)]
    pub temperature: bool,

    /// Seed for the temperature simulator
    #[arg(long, default_value = "4")]
    pub temperature_seed: u64,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Clear saved configuration
    #[arg(long)]
    pub clear: bool,
}

// ── LastUsedParams ─────────────────────────────────────────────────────────────

/// Persisted last-used parameters saved to `~/.fleet-analytics/last_used.json`.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct LastUsedParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bin_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rolling_window: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resample_hours: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_policy: Option<String>,
}

impl LastUsedParams {
    /// Return the default path to the persisted config file.
    /// Uses `~/.fleet-analytics/last_used.json`.
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Return the config path rooted at `base_dir` (used for testing).
    pub fn config_path_in(base_dir: &std::path::Path) -> PathBuf {
        base_dir.join(".fleet-analytics").join("last_used.json")
    }

    /// Load persisted params from the default path.
    /// Returns `Default` when the file is absent or cannot be parsed.
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load persisted params from an explicit path.
    pub fn load_from(path: &std::path::Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_default()
    }

    /// Atomically write params to the default path, creating parent directories
    /// if needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Atomically write params to an explicit path.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;

        // Write to a temp file then rename for atomicity.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;

        Ok(())
    }

    /// Delete the default config file if it exists.
    pub fn clear() -> Result<()> {
        Self::clear_at(&Self::config_path())
    }

    /// Delete the config file at an explicit path if it exists.
    pub fn clear_at(path: &std::path::Path) -> Result<()> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse CLI arguments, merge with last-used params where no explicit CLI
    /// value was provided, resolve `"auto"` values, and persist the result.
    pub fn load_with_last_used() -> Self {
        Self::load_with_last_used_impl(
            std::env::args_os().collect(),
            &LastUsedParams::config_path(),
        )
    }

    /// Same as [`load_with_last_used`] but accepts an explicit argument list,
    /// enabling unit-testing without spawning subprocesses.
    pub fn load_with_last_used_from_args(args: Vec<std::ffi::OsString>) -> Self {
        Self::load_with_last_used_impl(args, &LastUsedParams::config_path())
    }

    /// Full implementation that accepts args and an explicit config path so
    /// that tests can redirect to a temporary directory.
    pub fn load_with_last_used_impl(
        args: Vec<std::ffi::OsString>,
        config_path: &std::path::Path,
    ) -> Self {
        // Build raw ArgMatches so we can query ValueSource.
        let matches = Settings::command().get_matches_from(args.clone());

        // Parse into the typed struct using the same args.
        let mut settings = Settings::parse_from(args);

        if settings.clear {
            let _ = LastUsedParams::clear_at(config_path);
            // Resolve auto values and return without re-persisting.
            return Self::resolve_auto_values(settings, &matches);
        }

        let last = LastUsedParams::load_from(config_path);

        // Merge last-used values for fields that were NOT explicitly set on the
        // command line (CLI always wins).  Input paths are never loaded from
        // last-used.
        if !is_arg_explicitly_set(&matches, "timezone") {
            if let Some(v) = last.timezone {
                settings.timezone = v;
            }
        }
        // NOTE: clap stores the arg id using the *field name* (underscores),
        // not the long-flag spelling (hyphens).
        if !is_arg_explicitly_set(&matches, "bin_count") {
            if let Some(v) = last.bin_count {
                settings.bin_count = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "rolling_window") {
            if let Some(v) = last.rolling_window {
                settings.rolling_window = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "resample_hours") {
            if let Some(v) = last.resample_hours {
                settings.resample_hours = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "merge_policy") {
            if let Some(v) = last.merge_policy {
                settings.merge_policy = v;
            }
        }

        settings = Self::resolve_auto_values(settings, &matches);

        // Persist current settings for next run.
        let params = LastUsedParams::from(&settings);
        let _ = params.save_to(config_path);

        settings
    }

    /// Resolve `"auto"` sentinel values and apply the `--debug` flag.
    fn resolve_auto_values(mut settings: Settings, _matches: &clap::ArgMatches) -> Settings {
        // Resolve "auto" timezone → system timezone.
        if settings.timezone == "auto" {
            settings.timezone = crate::time_utils::get_system_timezone();
        }

        // --debug overrides log level.
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }

        settings
    }

    /// Resolve the numeric knobs into the options struct handed to the
    /// ingestion and aggregation layers.
    pub fn analysis_options(&self) -> Result<AnalysisOptions> {
        Ok(AnalysisOptions {
            block_size: self.block_size as usize,
            sample_stride: self.sample_stride as usize,
            rolling_window: self.rolling_window as usize,
            resample_interval: TimeDelta::hours(i64::from(self.resample_hours)),
            bin_count: self.bin_count as usize,
            merge_policy: self.merge_policy.parse()?,
        })
    }
}

// ── AnalysisOptions ────────────────────────────────────────────────────────────

/// Validated pipeline parameters, decoupled from the CLI surface.
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    /// Rows read per block before subsampling.
    pub block_size: usize,
    /// Keep every N-th row of each block; restarts at each block boundary.
    pub sample_stride: usize,
    /// Rolling mean window in samples.
    pub rolling_window: usize,
    /// Width of resample buckets.
    pub resample_interval: TimeDelta,
    /// Number of equal-width bins for correlation reports.
    pub bin_count: usize,
    /// Duplicate-entity handling.
    pub merge_policy: MergePolicy,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            block_size: 100_000,
            sample_stride: 100,
            rolling_window: 20,
            resample_interval: TimeDelta::hours(1),
            bin_count: 10,
            merge_policy: MergePolicy::Replace,
        }
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────────

impl From<&Settings> for LastUsedParams {
    fn from(s: &Settings) -> Self {
        LastUsedParams {
            timezone: Some(s.timezone.clone()),
            bin_count: Some(s.bin_count),
            rolling_window: Some(s.rolling_window),
            resample_hours: Some(s.resample_hours),
            merge_policy: Some(s.merge_policy.clone()),
        }
    }
}

// ── Helper: check if an arg was explicitly set on the command line ─────────────

/// Returns `true` when `name` was supplied explicitly on the command line
/// (not via default value or environment variable).
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches.value_source(name) == Some(clap::parser::ValueSource::CommandLine)
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    // ── Helpers ───────────────────────────────────────────────────────────────

    /// Build the config path inside `tmp`.
    fn tmp_config_path(tmp: &TempDir) -> PathBuf {
        LastUsedParams::config_path_in(tmp.path())
    }

    /// Save `params` to `tmp`, then load them back.
    fn round_trip(tmp: &TempDir, params: &LastUsedParams) -> LastUsedParams {
        let path = tmp_config_path(tmp);
        params.save_to(&path).expect("save");
        LastUsedParams::load_from(&path)
    }

    // ── test_last_used_params_save_load ───────────────────────────────────────

    #[test]
    fn test_last_used_params_save_load() {
        let tmp = TempDir::new().expect("tempdir");
        let params = LastUsedParams {
            timezone: Some("Europe/Berlin".to_string()),
            bin_count: Some(12),
            rolling_window: Some(30),
            resample_hours: Some(2),
            merge_policy: Some("append".to_string()),
        };

        let loaded = round_trip(&tmp, &params);

        assert_eq!(loaded.timezone, Some("Europe/Berlin".to_string()));
        assert_eq!(loaded.bin_count, Some(12));
        assert_eq!(loaded.rolling_window, Some(30));
        assert_eq!(loaded.resample_hours, Some(2));
        assert_eq!(loaded.merge_policy, Some("append".to_string()));
    }

    // ── test_last_used_params_clear ───────────────────────────────────────────

    #[test]
    fn test_last_used_params_clear() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);

        // Save something first.
        let params = LastUsedParams {
            timezone: Some("UTC".to_string()),
            ..Default::default()
        };
        params.save_to(&path).expect("save");
        assert!(path.exists(), "file must exist after save");

        // Clear it.
        LastUsedParams::clear_at(&path).expect("clear");
        assert!(!path.exists(), "file must be gone after clear");
    }

    // ── test_last_used_params_default_when_missing ────────────────────────────

    #[test]
    fn test_last_used_params_default_when_missing() {
        let tmp = TempDir::new().expect("tempdir");
        // No file created, so load should return default.
        let loaded = LastUsedParams::load_from(&tmp_config_path(&tmp));
        assert!(loaded.timezone.is_none());
        assert!(loaded.bin_count.is_none());
        assert!(loaded.rolling_window.is_none());
        assert!(loaded.resample_hours.is_none());
        assert!(loaded.merge_policy.is_none());
    }

    // ── test_settings_default_values ─────────────────────────────────────────

    #[test]
    fn test_settings_default_values() {
        // Parse with only the binary name (no flags) to get all defaults.
        let settings = Settings::parse_from(["fleet-analytics"]);

        assert!(settings.inputs.is_empty());
        assert!(settings.data_dir.is_none());
        assert_eq!(settings.output_dir, PathBuf::from("analysis_output"));
        assert_eq!(settings.block_size, 100_000);
        assert_eq!(settings.sample_stride, 100);
        assert_eq!(settings.rolling_window, 20);
        assert_eq!(settings.resample_hours, 1);
        assert_eq!(settings.bin_count, 10);
        assert_eq!(settings.merge_policy, "replace");
        assert_eq!(settings.timezone, "auto");
        assert!(!settings.temperature);
        assert_eq!(settings.temperature_seed, 4);
        assert_eq!(settings.log_level, "INFO");
        assert!(settings.log_file.is_none());
        assert!(!settings.debug);
        assert!(!settings.clear);
    }

    // ── test_from_settings_to_last_used ──────────────────────────────────────

    #[test]
    fn test_from_settings_to_last_used() {
        let settings = Settings {
            inputs: vec![PathBuf::from("a.csv")],
            data_dir: None,
            output_dir: PathBuf::from("out"),
            block_size: 50_000,
            sample_stride: 10,
            rolling_window: 15,
            resample_hours: 3,
            bin_count: 8,
            merge_policy: "error".to_string(),
            timezone: "America/New_York".to_string(),
            temperature: true,
            temperature_seed: 7,
            log_level: "INFO".to_string(),
            log_file: None,
            debug: false,
            clear: false,
        };

        let last = LastUsedParams::from(&settings);

        assert_eq!(last.timezone, Some("America/New_York".to_string()));
        assert_eq!(last.bin_count, Some(8));
        assert_eq!(last.rolling_window, Some(15));
        assert_eq!(last.resample_hours, Some(3));
        assert_eq!(last.merge_policy, Some("error".to_string()));
        // Input paths are NOT stored in LastUsedParams.
    }

    // ── test_settings_cli_parsing ─────────────────────────────────────────────

    #[test]
    fn test_settings_cli_positional_inputs() {
        let settings = Settings::parse_from(["fleet-analytics", "a.csv", "b.csv"]);
        assert_eq!(
            settings.inputs,
            vec![PathBuf::from("a.csv"), PathBuf::from("b.csv")]
        );
    }

    #[test]
    fn test_settings_cli_merge_policy() {
        let settings = Settings::parse_from(["fleet-analytics", "--merge-policy", "append"]);
        assert_eq!(settings.merge_policy, "append");
    }

    #[test]
    fn test_settings_cli_debug_flag() {
        let settings = Settings::parse_from(["fleet-analytics", "--debug"]);
        assert!(settings.debug);
    }

    #[test]
    fn test_settings_cli_data_dir() {
        let settings = Settings::parse_from(["fleet-analytics", "--data-dir", "/var/telemetry"]);
        assert_eq!(settings.data_dir, Some(PathBuf::from("/var/telemetry")));
    }

    #[test]
    fn test_settings_cli_log_file() {
        let settings = Settings::parse_from(["fleet-analytics", "--log-file", "/tmp/fa.log"]);
        assert_eq!(settings.log_file, Some(PathBuf::from("/tmp/fa.log")));
    }

    // ── test_analysis_options ─────────────────────────────────────────────────

    #[test]
    fn test_analysis_options_from_settings() {
        let settings = Settings::parse_from([
            "fleet-analytics",
            "--block-size",
            "500",
            "--sample-stride",
            "5",
            "--resample-hours",
            "2",
            "--merge-policy",
            "error",
        ]);
        let options = settings.analysis_options().expect("options");
        assert_eq!(options.block_size, 500);
        assert_eq!(options.sample_stride, 5);
        assert_eq!(options.rolling_window, 20);
        assert_eq!(options.resample_interval, TimeDelta::hours(2));
        assert_eq!(options.bin_count, 10);
        assert_eq!(options.merge_policy, MergePolicy::Error);
    }

    #[test]
    fn test_analysis_options_default() {
        let options = AnalysisOptions::default();
        assert_eq!(options.block_size, 100_000);
        assert_eq!(options.sample_stride, 100);
        assert_eq!(options.rolling_window, 20);
        assert_eq!(options.resample_interval, TimeDelta::hours(1));
        assert_eq!(options.bin_count, 10);
        assert_eq!(options.merge_policy, MergePolicy::Replace);
    }

    // ── test_load_with_last_used (uses config path injection) ─────────────────

    #[test]
    fn test_load_with_last_used_merges_persisted_bin_count() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);

        // Pre-populate last-used with a custom bin count.
        let params = LastUsedParams {
            timezone: Some("UTC".to_string()),
            bin_count: Some(16),
            ..Default::default()
        };
        params.save_to(&config_path).expect("save");

        // Parse without --bin-count flag → should use persisted value.
        let settings =
            Settings::load_with_last_used_impl(vec!["fleet-analytics".into()], &config_path);
        assert_eq!(settings.bin_count, 16);
    }

    #[test]
    fn test_load_with_last_used_cli_overrides_persisted() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);

        // Pre-populate last-used with append policy.
        let params = LastUsedParams {
            timezone: Some("UTC".to_string()),
            merge_policy: Some("append".to_string()),
            ..Default::default()
        };
        params.save_to(&config_path).expect("save");

        // Explicit --merge-policy error on CLI must win.
        let settings = Settings::load_with_last_used_impl(
            vec![
                "fleet-analytics".into(),
                "--merge-policy".into(),
                "error".into(),
            ],
            &config_path,
        );
        assert_eq!(settings.merge_policy, "error");
    }

    #[test]
    fn test_load_with_last_used_clear_removes_file() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);

        let params = LastUsedParams {
            bin_count: Some(20),
            ..Default::default()
        };
        params.save_to(&config_path).expect("save");
        assert!(config_path.exists(), "file must exist before clear");

        Settings::load_with_last_used_impl(
            vec!["fleet-analytics".into(), "--clear".into()],
            &config_path,
        );

        assert!(!config_path.exists(), "file must be gone after --clear");
    }

    #[test]
    fn test_load_with_last_used_debug_overrides_log_level() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);

        let settings = Settings::load_with_last_used_impl(
            vec!["fleet-analytics".into(), "--debug".into()],
            &config_path,
        );
        assert_eq!(settings.log_level, "DEBUG");
    }

    #[test]
    fn test_load_with_last_used_inputs_not_loaded_from_persisted() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);

        // Positional inputs come straight from the CLI; nothing is persisted.
        let settings = Settings::load_with_last_used_impl(
            vec!["fleet-analytics".into(), "ride.csv".into()],
            &config_path,
        );
        assert_eq!(settings.inputs, vec![PathBuf::from("ride.csv")]);
    }

    #[test]
    fn test_load_with_last_used_persists_after_run() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);

        Settings::load_with_last_used_impl(
            vec!["fleet-analytics".into(), "--bin-count".into(), "25".into()],
            &config_path,
        );

        // After a run the file should have been created.
        assert!(
            config_path.exists(),
            "config file must be persisted after run"
        );
        let loaded = LastUsedParams::load_from(&config_path);
        assert_eq!(loaded.bin_count, Some(25));
    }
}
