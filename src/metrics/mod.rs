//! Prometheus metrics for the lifecycle scheduler
//!
//! This module tracks:
//! - Publications and publish failures per stage
//! - Status polls by category and poll errors
//! - Content assembly retries and degraded publications
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec, Encoder,
    HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

use crate::models::Stage;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all scheduler metrics
struct SchedulerMetrics {
    publications: CounterVec,
    publish_failures: CounterVec,
    degraded_publications: CounterVec,
    assembly_retries: CounterVec,
    status_polls: CounterVec,
    poll_errors: Counter,
    provider_requests: CounterVec,
    provider_duration: HistogramVec,
}

/// Global storage for scheduler metrics
static SCHEDULER_METRICS: OnceLock<SchedulerMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// This function should be called once at application startup.
/// If metric registration fails, subsequent metric operations become no-ops.
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = SchedulerMetrics {
        publications: register_counter_vec!(
            "matchday_publications_total",
            "Announcements published, by stage",
            &["stage"]
        )?,
        publish_failures: register_counter_vec!(
            "matchday_publish_failures_total",
            "Failed publish attempts, by stage",
            &["stage"]
        )?,
        degraded_publications: register_counter_vec!(
            "matchday_degraded_publications_total",
            "Announcements published with partial or placeholder content",
            &["stage"]
        )?,
        assembly_retries: register_counter_vec!(
            "matchday_assembly_retries_total",
            "Content assembly retries, by stage",
            &["stage"]
        )?,
        status_polls: register_counter_vec!(
            "matchday_status_polls_total",
            "Status polls, by classified category",
            &["category"]
        )?,
        poll_errors: register_counter!(
            "matchday_poll_errors_total",
            "Status polls that failed to reach the provider"
        )?,
        provider_requests: register_counter_vec!(
            "matchday_provider_requests_total",
            "Provider requests by endpoint and HTTP status",
            &["endpoint", "status"]
        )?,
        provider_duration: register_histogram_vec!(
            "matchday_provider_request_duration_seconds",
            "Provider request duration in seconds",
            &["endpoint"],
            vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
        )?,
    };

    SCHEDULER_METRICS
        .set(metrics)
        .map_err(|_| "Scheduler metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    SCHEDULER_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record a successful publication
pub fn record_publication(stage: Stage, degraded: bool) {
    let Some(m) = SCHEDULER_METRICS.get() else {
        return;
    };

    m.publications.with_label_values(&[stage.as_str()]).inc();
    if degraded {
        m.degraded_publications
            .with_label_values(&[stage.as_str()])
            .inc();
    }
}

/// Record a failed publish attempt
pub fn record_publish_failure(stage: Stage) {
    if let Some(m) = SCHEDULER_METRICS.get() {
        m.publish_failures.with_label_values(&[stage.as_str()]).inc();
    }
}

/// Record a content assembly retry
pub fn record_assembly_retry(stage: Stage) {
    if let Some(m) = SCHEDULER_METRICS.get() {
        m.assembly_retries.with_label_values(&[stage.as_str()]).inc();
    }
}

/// Record a status poll and its classification
pub fn record_status_poll(category: &str, errored: bool) {
    let Some(m) = SCHEDULER_METRICS.get() else {
        return;
    };

    m.status_polls.with_label_values(&[category]).inc();
    if errored {
        m.poll_errors.inc();
    }
}

/// Record a provider request
pub fn record_provider_request(endpoint: &str, status: u16, duration_secs: f64) {
    let Some(m) = SCHEDULER_METRICS.get() else {
        return;
    };

    let status_str = status.to_string();
    m.provider_requests
        .with_label_values(&[endpoint, &status_str])
        .inc();
    m.provider_duration
        .with_label_values(&[endpoint])
        .observe(duration_secs);
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ensure_metrics_initialized() {
        let _ = init_metrics();
    }

    #[test]
    fn test_init_metrics_idempotent() {
        assert!(init_metrics().is_ok());
        assert!(init_metrics().is_ok());
    }

    #[test]
    fn test_encode_metrics() {
        ensure_metrics_initialized();
        record_publication(Stage::PreEvent, false);
        let text = encode_metrics().unwrap();
        assert!(text.contains("matchday_publications_total"));
    }

    #[test]
    fn test_recorders_do_not_panic() {
        ensure_metrics_initialized();
        record_publication(Stage::PostEvent, true);
        record_publish_failure(Stage::LiveEvent);
        record_assembly_retry(Stage::LiveEvent);
        record_status_poll("in_play", false);
        record_status_poll("unknown", true);
        record_provider_request("/fixtures", 200, 0.12);
    }
}
