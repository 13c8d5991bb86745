//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with latency histograms sized for
//! upstream language-model calls and standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all MedRAG metrics
pub const METRICS_PREFIX: &str = "medrag";

/// Histogram buckets for chat latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.000,  // 2s
    5.000,  // 5s
    10.00,  // 10s
    20.00,  // 20s
    30.00,  // 30s
    60.00,  // 60s
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

    // Chat pipeline metrics
    describe_counter!(
        format!("{}_chat_turns_total", METRICS_PREFIX),
        Unit::Count,
        "Total chat turns answered"
    );

    describe_histogram!(
        format!("{}_chat_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end chat pipeline latency in seconds"
    );

    describe_counter!(
        format!("{}_redactions_total", METRICS_PREFIX),
        Unit::Count,
        "Prompts in which personal information was masked"
    );

    describe_counter!(
        format!("{}_fallback_responses_total", METRICS_PREFIX),
        Unit::Count,
        "Chat turns answered with the fixed fallback message"
    );

    describe_counter!(
        format!("{}_translations_total", METRICS_PREFIX),
        Unit::Count,
        "Translation attempts by outcome"
    );

    // Upstream metrics
    describe_counter!(
        format!("{}_upstream_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total upstream API requests"
    );

    describe_histogram!(
        format!("{}_upstream_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Upstream API latency in seconds"
    );

    describe_counter!(
        format!("{}_upstream_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total upstream API errors"
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

/// Helper to record a completed chat turn
pub fn record_chat(duration_secs: f64, variant: &str, redacted: bool, fallback: bool) {
    counter!(
        format!("{}_chat_turns_total", METRICS_PREFIX),
        "variant" => variant.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_chat_duration_seconds", METRICS_PREFIX),
        "variant" => variant.to_string()
    )
    .record(duration_secs);

    if redacted {
        counter!(
            format!("{}_redactions_total", METRICS_PREFIX),
            "variant" => variant.to_string()
        )
        .increment(1);
    }

    if fallback {
        counter!(
            format!("{}_fallback_responses_total", METRICS_PREFIX),
            "variant" => variant.to_string()
        )
        .increment(1);
    }
}

/// Helper to record upstream call metrics
pub fn record_upstream(duration_secs: f64, service: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_upstream_requests_total", METRICS_PREFIX),
        "service" => service.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_upstream_duration_seconds", METRICS_PREFIX),
            "service" => service.to_string()
        )
        .record(duration_secs);
    } else {
        counter!(
            format!("{}_upstream_errors_total", METRICS_PREFIX),
            "service" => service.to_string()
        )
        .increment(1);
    }
}

/// Helper to record translation outcomes
pub fn record_translation(outcome: &str) {
    counter!(
        format!("{}_translations_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_buckets() {
        // Buckets must be strictly increasing
        let mut prev = 0.0;
        for &bucket in LATENCY_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }

        // Upper bucket covers the maximum upstream timeout
        assert!(LATENCY_BUCKETS.contains(&60.00));
    }

    #[test]
    fn test_request_metrics() {
        let metrics = RequestMetrics::start("POST", "/chat");
        std::thread::sleep(std::time::Duration::from_millis(10));
        metrics.finish(200);
        // Just verify it runs without panic
    }

    #[test]
    fn test_helpers_without_recorder() {
        record_chat(0.5, "patient", true, false);
        record_upstream(0.2, "retrieval", false);
        record_translation("translated");
    }
}
