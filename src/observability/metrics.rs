//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method and status
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_rejections_total` (counter): pipeline rejections by stage and code
//! - `gateway_rate_limited_total` (counter): rate-limit hits by profile
//! - `gateway_delayed_total` (counter): requests held by the delay governor
//! - `gateway_keys_neutralized_total` (counter): injection-guard rewrites
//! - `gateway_audit_events_total` (counter): audit events by kind
//! - `gateway_anomalies_total` (counter): error responses by status class
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Exposed via a Prometheus scrape endpoint on a separate address

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Install the Prometheus exporter on the given address.
pub fn init_metrics(addr: SocketAddr) {
    let builder = PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter started"),
        Err(e) => tracing::error!(error = %e, "Failed to start metrics exporter"),
    }
}

/// Record a completed request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds")
        .record(start.elapsed().as_secs_f64());
}

/// Record a pipeline rejection.
pub fn record_rejection(stage: &str, code: &str) {
    metrics::counter!(
        "gateway_rejections_total",
        "stage" => stage.to_string(),
        "code" => code.to_string()
    )
    .increment(1);
}

/// Record a rate-limit hit for a profile.
pub fn record_rate_limited(profile: &str) {
    metrics::counter!(
        "gateway_rate_limited_total",
        "profile" => profile.to_string()
    )
    .increment(1);
}

/// Record a request held by the delay governor.
pub fn record_delayed(delay: Duration) {
    metrics::counter!("gateway_delayed_total").increment(1);
    metrics::histogram!("gateway_delay_seconds").record(delay.as_secs_f64());
}

/// Record an injection-guard key rewrite.
pub fn record_key_neutralized() {
    metrics::counter!("gateway_keys_neutralized_total").increment(1);
}

/// Record a pre-handler audit event.
pub fn record_audit_event(kind: &str) {
    metrics::counter!(
        "gateway_audit_events_total",
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Record a post-response anomaly.
pub fn record_anomaly(status: u16) {
    let class = if status >= 500 { "5xx" } else { "4xx" };
    metrics::counter!(
        "gateway_anomalies_total",
        "class" => class
    )
    .increment(1);
}
