//! Authentication middleware for protected routes.
//!
//! Extracts the bearer token from the `Authorization` header, runs the
//! identity verifier, and injects the resulting [`AuthenticatedIdentity`]
//! into the request extensions for downstream stages and handlers. The
//! identity is an immutable value threaded through the request; nothing in
//! the pipeline mutates shared per-request state.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::instrument;

use crate::errors::GwError;
use crate::models::AuthenticatedIdentity;
use crate::routes::AppState;

/// Extract the bearer token from request headers.
///
/// A missing header maps to `MissingToken` (401 + `WWW-Authenticate`); a
/// header present but not in `Bearer <token>` form maps to `InvalidToken`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, GwError> {
    let header = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(GwError::MissingToken)?;

    header.strip_prefix("Bearer ").ok_or(GwError::InvalidToken)
}

/// Authentication middleware.
///
/// # Response
///
/// - 401 if the token is missing, invalid, expired, or revoked, or if the
///   subject has no directory record
/// - 403 if the account is inactive
/// - otherwise continues with the identity attached to the request
#[instrument(skip_all, name = "gw.middleware.auth")]
pub async fn require_identity(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, GwError> {
    let token = bearer_token(req.headers())?;

    let identity = state.verifier.authenticate(token).await?;

    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}

/// Extension trait for reading the authenticated identity off a request.
pub trait IdentityExt {
    /// The identity attached by [`require_identity`], if the middleware ran.
    fn identity(&self) -> Option<&AuthenticatedIdentity>;
}

impl<B> IdentityExt for axum::http::Request<B> {
    fn identity(&self) -> Option<&AuthenticatedIdentity> {
        self.extensions().get::<AuthenticatedIdentity>()
    }
}
