//! Operational endpoint handlers.
//!
//! - `/` - service banner
//! - `/health` - liveness probe, plain "OK"; checks nothing, a failure means
//!   the process is hung
//! - `/ready` - readiness probe with dependency detail
//! - `/metrics` - Prometheus exposition
//! - `/api/docs` - machine-readable surface description

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::models::ReadinessResponse;
use crate::routes::AppState;

/// Service name reported by the banner endpoints.
pub const SERVICE_NAME: &str = "fieldstone-gateway";

/// Root banner.
pub async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "docs": "/api/docs",
        "health": "/health",
    }))
}

/// Liveness probe handler.
///
/// Returns plain "OK" if the process is responsive. Deliberately checks no
/// dependencies: the orchestrator restarts the process when this fails.
pub async fn health_check() -> &'static str {
    "OK"
}

/// Readiness probe handler.
///
/// The shared cache is a soft dependency, so a degraded cache is reported
/// but never flips readiness: the gateway keeps serving, uncached and
/// without quota enforcement. The provider and directory are checked for
/// configuration only; their reachability is proven per-request.
///
/// Error detail stays in the logs; the body carries only generic state.
#[tracing::instrument(skip_all, name = "gw.health.readiness")]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    // A cheap cache round trip: exists() on a probe key exercises the
    // backend without mutating anything callers depend on.
    let cache_ok = {
        let probe = "gw:ready:probe";
        state.cache.set_json(probe, &1u8, Some(5)).await && state.cache.exists(probe).await
    };

    if !cache_ok {
        tracing::warn!(
            target: "gw.health",
            "Readiness check: shared cache unreachable, reporting degraded"
        );
    }

    Json(ReadinessResponse {
        status: "ready",
        cache: Some(if cache_ok { "available" } else { "degraded" }),
        identity_provider: Some(if state.config.identity_provider_url.is_empty() {
            "unconfigured"
        } else {
            "configured"
        }),
        error: None,
    })
}

/// Prometheus metrics endpoint.
pub async fn metrics_handler(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}

/// Minimal machine-readable API description.
pub async fn api_docs() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "public": [
            { "method": "GET", "path": "/" },
            { "method": "GET", "path": "/health" },
            { "method": "GET", "path": "/ready" },
            { "method": "GET", "path": "/metrics" },
            { "method": "POST", "path": "/api/v1/auth/verify-token" },
            { "method": "POST", "path": "/api/v1/auth/register" },
        ],
        "protected": [
            { "method": "GET", "path": "/api/v1/auth/me" },
            { "method": "POST", "path": "/api/v1/auth/refresh" },
            { "method": "POST", "path": "/api/v1/auth/logout" },
            { "method": "GET", "path": "/api/v1/users" },
            { "method": "GET", "path": "/api/v1/users/:id" },
            { "method": "PATCH", "path": "/api/v1/users/:id" },
        ],
    }))
}
