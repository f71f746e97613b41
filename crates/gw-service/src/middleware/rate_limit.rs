//! Rate-limit middleware.
//!
//! Runs first among the admission stages: the quota is checked and consumed
//! before authentication, keyed by the authenticated identity when one is
//! already present on the request and by client address otherwise. On
//! admission the outgoing response is decorated with `X-RateLimit-*` headers
//! reflecting the consumed quota, regardless of how the handler fared; on
//! denial the 429 carries the same headers with zero remaining.

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::instrument;

use crate::errors::{GwError, X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING, X_RATELIMIT_RESET};
use crate::models::AuthenticatedIdentity;
use crate::ratelimit::{client_key, Decision};
use crate::routes::AppState;

/// Rate-limit middleware for protected routes.
#[instrument(skip_all, name = "gw.middleware.rate_limit")]
pub async fn enforce_rate_limit(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, GwError> {
    let identity = req.extensions().get::<AuthenticatedIdentity>();
    let forwarded_for = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok());
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip());

    let client = client_key(identity, forwarded_for, peer);
    let path = req.uri().path().to_string();

    match state.limiter.check_and_consume(&client, &path).await {
        Decision::Denied {
            limit,
            retry_after,
            reset,
        } => Err(GwError::RateLimited {
            limit,
            retry_after,
            reset,
        }),
        Decision::Allowed {
            limit,
            remaining,
            reset,
        } => {
            let mut response = next.run(req).await;
            let headers = response.headers_mut();
            headers.insert(X_RATELIMIT_LIMIT, limit.into());
            headers.insert(X_RATELIMIT_REMAINING, remaining.into());
            headers.insert(X_RATELIMIT_RESET, reset.into());
            Ok(response)
        }
    }
}
