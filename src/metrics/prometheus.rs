//! Prometheus metrics registration and export.
//!
//! Defines every metric autopress records and provides functions for
//! initializing the registry and exporting it in text format.

use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all autopress metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Pipeline runs, labeled by outcome (published, flagged, skipped, retry, failed).
pub static RUNS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// End-to-end run duration in seconds.
pub static RUN_DURATION: OnceLock<Histogram> = OnceLock::new();

/// Handler attempts, labeled by capability, handler and status.
pub static HANDLER_REQUESTS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Handler attempt latency in seconds, labeled by capability and handler.
pub static HANDLER_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Distribution of composite quality scores (0-100).
pub static QUALITY_SCORE: OnceLock<Histogram> = OnceLock::new();

/// Image slots that could not be filled.
pub static IMAGE_SLOT_FAILURES: OnceLock<Counter> = OnceLock::new();

/// Translation work items, labeled by final status.
pub static TRANSLATIONS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Work items currently in flight.
pub static RUNS_IN_PROGRESS: OnceLock<Gauge> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Call once at startup. Calling again is harmless: the first registry wins.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric creation or registration fails.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    // Run metrics
    let runs_total = CounterVec::new(
        Opts::new("autopress_runs_total", "Total pipeline runs by outcome"),
        &["outcome"],
    )?;

    let run_duration = Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "autopress_run_duration_seconds",
            "Pipeline run duration in seconds",
        )
        .buckets(vec![10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0]),
    )?;

    let runs_in_progress = Gauge::new(
        "autopress_runs_in_progress",
        "Number of work items currently being processed",
    )?;

    // Handler metrics
    let handler_requests_total = CounterVec::new(
        Opts::new(
            "autopress_handler_requests_total",
            "Total capability handler attempts",
        ),
        &["capability", "handler", "status"],
    )?;

    let handler_latency = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "autopress_handler_latency_seconds",
            "Capability handler latency in seconds",
        )
        .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]),
        &["capability", "handler"],
    )?;

    // Content metrics
    let quality_score = Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "autopress_quality_score",
            "Distribution of composite quality scores",
        )
        .buckets(vec![10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 100.0]),
    )?;

    let image_slot_failures = Counter::new(
        "autopress_image_slot_failures_total",
        "Image slots that could not be filled",
    )?;

    let translations_total = CounterVec::new(
        Opts::new(
            "autopress_translations_total",
            "Translation work items by final status",
        ),
        &["status"],
    )?;

    registry.register(Box::new(runs_total.clone()))?;
    registry.register(Box::new(run_duration.clone()))?;
    registry.register(Box::new(runs_in_progress.clone()))?;
    registry.register(Box::new(handler_requests_total.clone()))?;
    registry.register(Box::new(handler_latency.clone()))?;
    registry.register(Box::new(quality_score.clone()))?;
    registry.register(Box::new(image_slot_failures.clone()))?;
    registry.register(Box::new(translations_total.clone()))?;

    // Already-initialized statics keep their first value.
    let _ = REGISTRY.set(registry);
    let _ = RUNS_TOTAL.set(runs_total);
    let _ = RUN_DURATION.set(run_duration);
    let _ = RUNS_IN_PROGRESS.set(runs_in_progress);
    let _ = HANDLER_REQUESTS_TOTAL.set(handler_requests_total);
    let _ = HANDLER_LATENCY.set(handler_latency);
    let _ = QUALITY_SCORE.set(quality_score);
    let _ = IMAGE_SLOT_FAILURES.set(image_slot_failures);
    let _ = TRANSLATIONS_TOTAL.set(translations_total);

    tracing::info!("Prometheus metrics initialized");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// Returns an explanatory comment line if the registry has not been
/// initialized or encoding fails.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics() {
        let result = init_metrics();
        assert!(result.is_ok() || REGISTRY.get().is_some());
    }

    #[test]
    fn test_export_never_empty() {
        let metrics = export_metrics();
        assert!(!metrics.is_empty());
    }

    #[test]
    fn test_metrics_after_init() {
        let _ = init_metrics();

        if let Some(runs) = RUNS_TOTAL.get() {
            runs.with_label_values(&["published"]).inc();
        }

        let metrics = export_metrics();
        assert!(!metrics.starts_with("# Error"));
        if REGISTRY.get().is_some() {
            assert!(metrics.contains("autopress_runs_total"));
        }
    }
}
