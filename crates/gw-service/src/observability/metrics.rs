//! Metrics definitions for the gateway.
//!
//! All metrics follow Prometheus naming conventions:
//! - `gw_` prefix for the gateway
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `method`: 7 values max (GET, POST, PATCH, DELETE, PUT, HEAD, OPTIONS)
//! - `endpoint`: fixed set of route shapes (path parameters are normalized)
//! - `status`: 3 values (success, error, timeout)
//! - `outcome` / `decision` / `op`: bounded by code

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus metrics recorder and return the handle for
/// serving the `/metrics` endpoint.
///
/// Must be called once, before any metric is recorded.
///
/// # Errors
///
/// Returns an error if the recorder fails to install (e.g. already
/// installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("gw_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

/// Record an HTTP request completion.
///
/// Metrics: `gw_http_requests_total`, `gw_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("gw_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint.clone(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("gw_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record an authentication outcome.
///
/// Metric: `gw_auth_outcomes_total`
/// Label: `outcome` in {cache_hit, verified, provider_rejected,
/// user_not_found, account_inactive, directory_unavailable}
pub fn record_auth_outcome(outcome: &'static str) {
    counter!("gw_auth_outcomes_total", "outcome" => outcome).increment(1);
}

/// Record a cache operation outcome.
///
/// Metric: `gw_cache_operations_total`
/// Labels: `op`, `outcome` in {hit, miss, ok, error}
pub fn record_cache_operation(op: &'static str, outcome: &'static str) {
    counter!("gw_cache_operations_total", "op" => op, "outcome" => outcome).increment(1);
}

/// Record a rate-limit decision.
///
/// Metric: `gw_rate_limit_decisions_total`
/// Label: `decision` in {allowed, denied, fail_open}
pub fn record_rate_limit_decision(decision: &'static str) {
    counter!("gw_rate_limit_decisions_total", "decision" => decision).increment(1);
}

/// Collapse path parameters so endpoint labels stay low-cardinality.
///
/// Known parameterized routes map to their route shape; anything else keeps
/// only its first two path segments.
fn normalize_endpoint(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("/api/v1/users/") {
        if !rest.is_empty() {
            return "/api/v1/users/:id".to_string();
        }
    }

    let known = [
        "/",
        "/health",
        "/ready",
        "/metrics",
        "/api/docs",
        "/api/v1/users",
        "/api/v1/auth/verify-token",
        "/api/v1/auth/register",
        "/api/v1/auth/refresh",
        "/api/v1/auth/logout",
        "/api/v1/auth/me",
    ];
    if known.contains(&path) {
        return path.to_string();
    }

    let mut segments = path.split('/').filter(|segment| !segment.is_empty());
    match (segments.next(), segments.next()) {
        (Some(first), Some(second)) => format!("/{first}/{second}"),
        (Some(first), None) => format!("/{first}"),
        _ => "/".to_string(),
    }
}

fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=399 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}
