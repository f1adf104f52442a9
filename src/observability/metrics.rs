//! Metrics collection.
//!
//! # Metrics
//! - `upstream_requests_total` (counter): completed requests by endpoint and outcome
//! - `upstream_pending` (gauge): open requests per endpoint (busyness)
//! - `upstream_request_timeouts_total` (counter): sweep-forced timeouts
//! - `upstream_endpoint_healthy` (gauge): 1=healthy, 0=unhealthy

use metrics::{counter, gauge};

pub(crate) fn record_completion(endpoint: &str, outcome: &'static str) {
    counter!(
        "upstream_requests_total",
        "endpoint" => endpoint.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub(crate) fn record_pending(endpoint: &str, pending: u32) {
    gauge!("upstream_pending", "endpoint" => endpoint.to_string()).set(pending as f64);
}

pub(crate) fn record_timeout(endpoint: &str) {
    counter!("upstream_request_timeouts_total", "endpoint" => endpoint.to_string()).increment(1);
}

pub(crate) fn record_health(endpoint: &str, healthy: bool) {
    gauge!("upstream_endpoint_healthy", "endpoint" => endpoint.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}
