//! Concurrent per-entity analysis pool.
//!
//! [`AnalysisPool`] spawns one tokio task per entity and streams finished
//! [`EntityReport`]s through an `mpsc` channel, so the caller can write
//! reports as they complete without any shared mutable state.

use analytics_core::settings::AnalysisOptions;
use analytics_data::analysis::{analyze_entity, EntityReport};
use analytics_data::loader::EntityMap;
use tokio::sync::mpsc;

// ── AnalysisPool ──────────────────────────────────────────────────────────────

/// Fan-out coordinator for per-entity analysis.
///
/// Entities are analysed independently of one another, so each one gets its
/// own task. Reports arrive on the channel in completion order, not entity
/// order.
pub struct AnalysisPool {
    /// Analysis parameters shared by every worker.
    options: AnalysisOptions,
}

impl AnalysisPool {
    pub fn new(options: AnalysisOptions) -> Self {
        Self { options }
    }

    /// Start one analysis task per entity in `entities`.
    ///
    /// Returns:
    /// - An `mpsc::Receiver<EntityReport>` for the caller to drain. The
    ///   channel closes once every worker has finished.
    /// - A [`PoolHandle`] that can be used to abort outstanding tasks.
    pub fn start(self, entities: EntityMap) -> (mpsc::Receiver<EntityReport>, PoolHandle) {
        // Buffer a modest number of reports so a slow consumer doesn't stall
        // every worker at once.
        let (tx, rx) = mpsc::channel(16);

        let mut handles = Vec::new();
        for series in entities.into_series() {
            let tx = tx.clone();
            let options = self.options.clone();
            handles.push(tokio::spawn(async move {
                tracing::debug!("analysing entity {}", series.entity_id);
                let report = analyze_entity(&series, &options);
                if let Err(e) = tx.send(report).await {
                    tracing::warn!(error = %e, "failed to send entity report; receiver dropped");
                }
            }));
        }
        // Workers hold the remaining senders; the channel closes when the
        // last one finishes.
        drop(tx);

        (rx, PoolHandle { handles })
    }
}

// ── PoolHandle ────────────────────────────────────────────────────────────────

/// A handle to the in-flight analysis tasks.
pub struct PoolHandle {
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl PoolHandle {
    /// Immediately abort every outstanding analysis task.
    pub fn abort(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }

    /// Number of workers the pool started with.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
