use std::collections::HashSet;
use std::path::{Path, PathBuf};

use analytics_core::error::{AnalyticsError, Result};
use analytics_core::settings::Settings;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ── Directory bootstrap ────────────────────────────────────────────────────────

/// Ensure the configuration and output directories exist.
///
/// Creates the following directories if absent (including any missing parents):
/// - `~/.fleet-analytics/` (persisted last-used parameters)
/// - the configured output directory
pub fn ensure_directories(output_dir: &Path) -> anyhow::Result<()> {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(home.join(".fleet-analytics"))?;
    std::fs::create_dir_all(output_dir)?;
    Ok(())
}

// ── Logging bootstrap ──────────────────────────────────────────────────────────

/// Initialise the global `tracing` subscriber.
///
/// `log_level` is mapped to a [`tracing_subscriber::EnvFilter`] directive.
/// Falls back to `"info"` if the level string is not recognised.
///
/// When `log_file` is given, events are appended there without ANSI colour;
/// otherwise they go to stderr.
pub fn setup_logging(log_level: &str, log_file: Option<&PathBuf>) -> anyhow::Result<()> {
    // Map Python log-level names to tracing level names (tracing uses lowercase).
    let upper = log_level.to_uppercase();
    let normalised = match upper.as_str() {
        "DEBUG" | "CRITICAL" => "debug",
        "INFO" => "info",
        "WARNING" => "warn",
        "ERROR" => "error",
        other => other,
    };

    let filter = EnvFilter::try_new(normalised).unwrap_or_else(|_| EnvFilter::new("info"));

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            let layer = fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_ansi(false)
                .with_writer(std::sync::Arc::new(file));
            tracing_subscriber::registry().with(filter).with(layer).init();
        }
        None => {
            let layer = fmt::layer().with_target(false).with_thread_ids(false);
            tracing_subscriber::registry().with(filter).with(layer).init();
        }
    }

    Ok(())
}

// ── Input discovery ────────────────────────────────────────────────────────────

/// Recursively collect `.csv` files under `dir`.
///
/// The extension match is case-insensitive and the result is sorted so runs
/// are deterministic regardless of directory iteration order.
pub fn find_csv_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .map(|ext| ext.eq_ignore_ascii_case("csv"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

/// Resolve the telemetry files for this run: explicit positional paths first,
/// then a recursive `--data-dir` scan. Duplicates are dropped, keeping the
/// first occurrence.
pub fn collect_inputs(settings: &Settings) -> Result<Vec<PathBuf>> {
    let mut inputs = settings.inputs.clone();
    if let Some(dir) = &settings.data_dir {
        inputs.extend(find_csv_files(dir));
    }

    let mut seen = HashSet::new();
    inputs.retain(|path| seen.insert(path.clone()));

    if inputs.is_empty() {
        let searched = settings
            .data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        return Err(AnalyticsError::NoDataFiles(searched));
    }

    Ok(inputs)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
