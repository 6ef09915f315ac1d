mod bootstrap;
mod export;

use std::time::Instant;

use analytics_core::settings::Settings;
use analytics_core::time_utils::TimezoneHandler;
use analytics_data::loader;
use analytics_runtime::temperature::{attach_temperature, SimulatedClimate};
use analytics_runtime::workers::AnalysisPool;
use anyhow::Result;
use chrono::Utc;

use crate::export::{RunSummary, SeriesWriter};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load_with_last_used();

    bootstrap::ensure_directories(&settings.output_dir)?;
    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_ref())?;

    tracing::info!("Fleet Analytics v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Timezone: {}, merge policy: {}, output: {}",
        settings.timezone,
        settings.merge_policy,
        settings.output_dir.display()
    );

    let options = settings.analysis_options()?;
    let timezone = TimezoneHandler::new(&settings.timezone);
    let inputs = bootstrap::collect_inputs(&settings)?;

    tracing::info!("Ingesting {} telemetry file(s)...", inputs.len());

    let load_started = Instant::now();
    let mut entities = loader::load_files(&inputs, &options, &timezone)?;
    let load_time_seconds = load_started.elapsed().as_secs_f64();

    if entities.is_empty() {
        tracing::warn!("No usable telemetry rows found; nothing to analyse");
        return Ok(());
    }
    tracing::info!(
        "Loaded {} entities in {:.2}s",
        entities.len(),
        load_time_seconds
    );

    if settings.temperature {
        let climate = SimulatedClimate::new(settings.temperature_seed);
        for series in entities.series_mut() {
            attach_temperature(series, &climate);
        }
        tracing::info!(
            "Attached simulated temperature columns (seed {})",
            settings.temperature_seed
        );
    }

    let files_processed = inputs.len();
    let entity_count = entities.len();

    // Fan the entities out over the worker pool and write each report as it
    // lands. Ctrl+C aborts the remaining workers and exits non-zero.
    let aggregate_started = Instant::now();
    let (mut rx, handle) = AnalysisPool::new(options).start(entities);
    let writer = SeriesWriter::new(&settings.output_dir);
    let mut series_written = 0;

    loop {
        tokio::select! {
            report = rx.recv() => match report {
                Some(report) => {
                    series_written += writer.write_entity(&report)?;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received; aborting analysis");
                handle.abort();
                anyhow::bail!("interrupted");
            }
        }
    }
    let aggregate_time_seconds = aggregate_started.elapsed().as_secs_f64();

    let summary = RunSummary {
        generated_at: Utc::now().to_rfc3339(),
        files_processed,
        entities: entity_count,
        series_written,
        load_time_seconds,
        aggregate_time_seconds,
    };
    let manifest = writer.write_manifest(&summary)?;

    tracing::info!(
        "Wrote {} series files for {} entities; manifest at {}",
        series_written,
        entity_count,
        manifest.display()
    );

    Ok(())
}
