//! HTTP routes for the gateway.
//!
//! Defines the Axum router and application state. The admission pipeline is
//! realized structurally: public routes (the allow-list) carry none of the
//! admission layers, protected routes carry all of them in order.

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::auth::{IdentityVerifier, RouteRoleTable};
use crate::cache::CacheClient;
use crate::config::Config;
use crate::directory::UserDirectory;
use crate::handlers;
use crate::middleware::{
    enforce_min_role, enforce_rate_limit, http_metrics_middleware, require_identity,
};
use crate::provider::IdentityProvider;
use crate::ratelimit::FixedWindowLimiter;

/// Application state shared across handlers and middleware.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Fail-soft shared-cache client.
    pub cache: CacheClient,

    /// Identity verifier (provider + directory + cache).
    pub verifier: Arc<IdentityVerifier>,

    /// Fixed-window rate limiter.
    pub limiter: Arc<FixedWindowLimiter>,

    /// Route-level minimum-role table.
    pub route_roles: RouteRoleTable,

    /// Identity provider client, used directly by pre-auth endpoints.
    pub provider: Arc<dyn IdentityProvider>,

    /// User directory client.
    pub directory: Arc<dyn UserDirectory>,
}

/// Build the application routes.
///
/// - Public allow-list (no admission stages): `/`, `/health`, `/ready`,
///   `/metrics`, `/api/docs`, `/api/v1/auth/verify-token`,
///   `/api/v1/auth/register`
/// - Protected routes run the admission stages in order:
///   rate limit -> authentication -> authorization
/// - Global layers: HTTP metrics (outermost, sees every response), CORS
///   (handles preflight short-circuits), request tracing, 30s timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: Option<PrometheusHandle>) -> Router {
    let public_routes = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/api/docs", get(handlers::api_docs))
        .route("/api/v1/auth/verify-token", post(handlers::verify_token))
        .route("/api/v1/auth/register", post(handlers::register))
        .with_state(state.clone());

    // Metrics route carries its own state; omitted when no recorder is
    // installed (tests).
    let metrics_routes = match metrics_handle {
        Some(handle) => Router::new()
            .route("/metrics", get(handlers::metrics_handler))
            .with_state(handle),
        None => Router::new(),
    };

    // Admission layer order (route_layer stacks bottom-up, so the last
    // layer added executes first): rate limit, then authentication, then
    // the route role gate.
    let protected_routes = Router::new()
        .route("/api/v1/auth/me", get(handlers::me))
        .route("/api/v1/auth/refresh", post(handlers::refresh))
        .route("/api/v1/auth/logout", post(handlers::logout))
        .route("/api/v1/users", get(handlers::list_users))
        .route(
            "/api/v1/users/:id",
            get(handlers::get_user).patch(handlers::update_user),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            enforce_min_role,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_identity,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            enforce_rate_limit,
        ))
        .with_state(state.clone());

    public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.allowed_origins))
        .layer(middleware::from_fn(http_metrics_middleware))
}

/// CORS layer from the configured origin list.
///
/// A `*` entry allows any origin without credentials; otherwise the exact
/// origin list is allowed with credentials.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::ORIGIN,
        ]);

    if allowed_origins.iter().any(|origin| origin == "*") {
        layer.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        layer.allow_origin(origins).allow_credentials(true)
    }
}
