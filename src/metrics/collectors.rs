//! High-level recording facade over the Prometheus statics.
//!
//! Every method is a no-op until `init_metrics()` has run, so library code
//! and tests can record unconditionally.

use super::prometheus::{
    HANDLER_LATENCY, HANDLER_REQUESTS_TOTAL, IMAGE_SLOT_FAILURES, QUALITY_SCORE, RUNS_IN_PROGRESS,
    RUNS_TOTAL, RUN_DURATION, TRANSLATIONS_TOTAL,
};

/// Metrics collector for recording autopress operational metrics.
///
/// ```ignore
/// use autopress::metrics::{init_metrics, MetricsCollector};
///
/// init_metrics()?;
/// let collector = MetricsCollector::new();
/// collector.record_run("published", 84.2);
/// collector.record_handler_attempt("generate", "anthropic", true, 31.0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Record a finished pipeline run.
    ///
    /// `outcome` is one of `published`, `flagged`, `skipped`, `retry`, `failed`.
    pub fn record_run(&self, outcome: &str, duration_secs: f64) {
        if let Some(runs) = RUNS_TOTAL.get() {
            runs.with_label_values(&[outcome]).inc();
        }

        if let Some(duration) = RUN_DURATION.get() {
            duration.observe(duration_secs);
        }

        tracing::trace!(
            outcome = outcome,
            duration_secs = duration_secs,
            "Recorded run metric"
        );
    }

    /// Record a single capability handler attempt.
    pub fn record_handler_attempt(
        &self,
        capability: &str,
        handler: &str,
        success: bool,
        latency_secs: f64,
    ) {
        let status = if success { "success" } else { "failure" };

        if let Some(requests) = HANDLER_REQUESTS_TOTAL.get() {
            requests
                .with_label_values(&[capability, handler, status])
                .inc();
        }

        if let Some(latency) = HANDLER_LATENCY.get() {
            latency
                .with_label_values(&[capability, handler])
                .observe(latency_secs);
        }
    }

    /// Record a composite quality score.
    pub fn record_quality(&self, score: f64) {
        if let Some(quality) = QUALITY_SCORE.get() {
            quality.observe(score);
        }
    }

    /// Record image slots that could not be filled.
    pub fn record_image_failures(&self, count: usize) {
        if count == 0 {
            return;
        }
        if let Some(failures) = IMAGE_SLOT_FAILURES.get() {
            failures.inc_by(count as f64);
        }
    }

    /// Record the final status of a translation work item.
    pub fn record_translation(&self, status: &str) {
        if let Some(translations) = TRANSLATIONS_TOTAL.get() {
            translations.with_label_values(&[status]).inc();
        }
    }

    /// Mark a work item as started.
    pub fn inc_in_progress(&self) {
        if let Some(gauge) = RUNS_IN_PROGRESS.get() {
            gauge.inc();
        }
    }

    /// Mark a work item as finished.
    pub fn dec_in_progress(&self) {
        if let Some(gauge) = RUNS_IN_PROGRESS.get() {
            gauge.dec();
        }
    }
}
