//! Gateway error taxonomy and HTTP rendering.
//!
//! Every rejection renders as a structured `{success: false, message}` body
//! with the status matching the error kind. Provider and directory failures
//! are logged with their real cause but surface only a generic message, so
//! the verifier cannot be used as an oracle.

use crate::models::{ApiMessage, Role};
use axum::{
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

#[derive(Debug, Error)]
pub enum GwError {
    #[error("Authorization token required")]
    MissingToken,

    #[error("Invalid authentication token")]
    InvalidToken,

    #[error("Authentication token has expired")]
    TokenExpired,

    #[error("Authentication token has been revoked")]
    TokenRevoked,

    #[error("User not found in system")]
    UserNotFound,

    #[error("User account is inactive")]
    AccountInactive,

    #[error("Insufficient permissions: required role {required}")]
    InsufficientRole { required: Role },

    #[error("Rate limit exceeded")]
    RateLimited {
        limit: u32,
        retry_after: u64,
        reset: i64,
    },

    #[error("Upstream identity service error: {0}")]
    Upstream(String),

    #[error("User directory error: {0}")]
    Directory(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error")]
    Internal,
}

impl From<crate::auth::AuthError> for GwError {
    fn from(e: crate::auth::AuthError) -> Self {
        use crate::auth::AuthError;
        match e {
            AuthError::InvalidToken => GwError::InvalidToken,
            AuthError::TokenExpired => GwError::TokenExpired,
            AuthError::TokenRevoked => GwError::TokenRevoked,
            AuthError::UserNotFound => GwError::UserNotFound,
            AuthError::AccountInactive => GwError::AccountInactive,
            AuthError::Upstream(detail) => GwError::Upstream(detail),
        }
    }
}

impl From<crate::provider::ProviderError> for GwError {
    fn from(e: crate::provider::ProviderError) -> Self {
        use crate::provider::ProviderError;
        match e {
            ProviderError::InvalidToken => GwError::InvalidToken,
            ProviderError::TokenExpired => GwError::TokenExpired,
            ProviderError::TokenRevoked => GwError::TokenRevoked,
            ProviderError::Unavailable(detail) => GwError::Upstream(detail),
        }
    }
}

impl IntoResponse for GwError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            GwError::MissingToken => (
                StatusCode::UNAUTHORIZED,
                "Authorization token required".to_string(),
            ),
            // The three token failure kinds are deliberately indistinguishable
            // on the wire; the distinction exists for logs and metrics only.
            GwError::InvalidToken | GwError::TokenExpired | GwError::TokenRevoked => (
                StatusCode::UNAUTHORIZED,
                "Invalid authentication token".to_string(),
            ),
            GwError::UserNotFound => (
                StatusCode::UNAUTHORIZED,
                "User not found in system".to_string(),
            ),
            GwError::AccountInactive => (
                StatusCode::FORBIDDEN,
                "User account is inactive".to_string(),
            ),
            GwError::InsufficientRole { required } => (
                StatusCode::FORBIDDEN,
                format!("Insufficient permissions. Required role: {required}"),
            ),
            GwError::RateLimited { .. } => {
                (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded".to_string())
            }
            GwError::Upstream(detail) => {
                // Identity cannot be established without the provider, so the
                // caller sees an authentication failure; the real cause is
                // logged for operators.
                tracing::error!(
                    target: "gw.errors",
                    error = %detail,
                    "Upstream identity dependency failure surfaced as 401"
                );
                (
                    StatusCode::UNAUTHORIZED,
                    "Invalid authentication token".to_string(),
                )
            }
            GwError::Directory(detail) => {
                tracing::error!(
                    target: "gw.errors",
                    error = %detail,
                    "User directory failure"
                );
                (
                    StatusCode::BAD_GATEWAY,
                    "User directory unavailable".to_string(),
                )
            }
            GwError::Conflict(message) => (StatusCode::CONFLICT, message.clone()),
            GwError::NotFound(message) => (StatusCode::NOT_FOUND, message.clone()),
            GwError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An internal error occurred".to_string(),
            ),
        };

        let body = ApiMessage {
            success: false,
            message,
        };
        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }

        if let GwError::RateLimited {
            limit,
            retry_after,
            reset,
        } = &self
        {
            let headers = response.headers_mut();
            headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(*limit));
            headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(0u32));
            headers.insert(X_RATELIMIT_RESET, HeaderValue::from(*reset));
            headers.insert(header::RETRY_AFTER, HeaderValue::from(*retry_after));
        }

        response
    }
}
