//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway and load balancer metrics
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `lb_leases_total` (counter): successful leases by route, strategy
//! - `lb_releases_total` (counter): releases by route, strategy
//! - `lb_lease_failures_total` (counter): failed resolutions/leases by route, reason
//! - `lb_double_release_total` (counter): release defects by route
//! - `lb_balancers_created_total` (counter): balancers built by strategy
//! - `lb_balancers_evicted_total` (counter)
//! - `gateway_requests_total` (counter): requests by method, status, route
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so unit tests need no setup

use std::net::SocketAddr;
use std::time::Instant;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_lease(route: &str, strategy: &'static str) {
    counter!("lb_leases_total", "route" => route.to_string(), "strategy" => strategy).increment(1);
}

pub fn record_release(route: &str, strategy: &'static str) {
    counter!("lb_releases_total", "route" => route.to_string(), "strategy" => strategy).increment(1);
}

pub fn record_lease_failure(route: &str, reason: &'static str) {
    counter!("lb_lease_failures_total", "route" => route.to_string(), "reason" => reason).increment(1);
}

pub fn record_double_release(route: &str) {
    counter!("lb_double_release_total", "route" => route.to_string()).increment(1);
}

pub fn record_balancer_created(strategy: &'static str) {
    counter!("lb_balancers_created_total", "strategy" => strategy).increment(1);
}

pub fn record_balancer_evicted(count: u64) {
    counter!("lb_balancers_evicted_total").increment(count);
}

/// Record one completed gateway request.
pub fn record_request(method: &str, status: u16, route: &str, start: Instant) {
    counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "route" => route.to_string()
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds", "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}
