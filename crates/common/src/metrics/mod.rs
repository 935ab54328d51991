//! Metrics and observability utilities
//!
//! Prometheus metrics for HTTP traffic and bulk imports,
//! with standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all PaperVault metrics
pub const METRICS_PREFIX: &str = "papervault";

/// Histogram buckets for request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005,
    0.010,
    0.025,
    0.050,
    0.100,
    0.250,
    0.500,
    1.000,
    2.500,
    5.000,
    10.00,
];

/// Buckets for whole-archive import runs, which take minutes on large archives
pub const IMPORT_BUCKETS: &[f64] = &[
    0.5,
    1.0,
    5.0,
    15.0,
    30.0,
    60.0,
    120.0,
    300.0,
    600.0,
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Import metrics
    describe_counter!(
        format!("{}_import_runs_total", METRICS_PREFIX),
        Unit::Count,
        "Bulk import runs by outcome"
    );

    describe_counter!(
        format!("{}_import_rows_total", METRICS_PREFIX),
        Unit::Count,
        "Metadata rows processed by bulk imports, by outcome"
    );

    describe_histogram!(
        format!("{}_import_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Bulk import run duration in seconds"
    );

    // Auth metrics
    describe_counter!(
        format!("{}_login_attempts_total", METRICS_PREFIX),
        Unit::Count,
        "Login attempts by outcome"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Record one processed metadata row; `outcome` is success, skipped or failed
pub fn record_import_row(outcome: &'static str) {
    counter!(
        format!("{}_import_rows_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a finished (or aborted) import run
pub fn record_import_run(duration_secs: f64, completed: bool) {
    let outcome = if completed { "completed" } else { "aborted" };

    counter!(
        format!("{}_import_runs_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);

    histogram!(format!("{}_import_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

/// Record a login attempt
pub fn record_login(success: bool) {
    let outcome = if success { "success" } else { "failure" };

    counter!(
        format!("{}_login_attempts_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_sorted() {
        for buckets in [LATENCY_BUCKETS, IMPORT_BUCKETS] {
            assert!(buckets.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_recorders_without_exporter() {
        // No recorder installed: calls must be no-ops
        let metrics = RequestMetrics::start("GET", "/api/papers");
        metrics.finish(200);
        record_import_row("skipped");
        record_import_run(1.5, true);
        record_login(false);
    }
}
