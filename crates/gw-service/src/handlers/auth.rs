//! Authentication endpoints.
//!
//! `verify-token` and `register` are public by necessity (they run before a
//! session exists) and verify the bearer token inline; the remaining
//! endpoints sit behind the admission pipeline and read the identity from
//! request extensions.

use axum::{
    extract::{Extension, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::auth::rbac;
use crate::errors::GwError;
use crate::middleware::bearer_token;
use crate::models::{
    AccountStatus, ApiMessage, AuthenticatedIdentity, IdentityResponse, RegisterRequest,
    UserRecord, UserResponse, VerifyTokenRequest,
};
use crate::routes::AppState;

/// `POST /api/v1/auth/verify-token`
///
/// Full verifier pass over a token supplied in the body: provider
/// verification, directory lookup, inactive gate, cache write. The response
/// mirrors what the admission pipeline would attach for the same token.
#[instrument(skip_all, name = "gw.handlers.verify_token")]
pub async fn verify_token(
    State(state): State<Arc<AppState>>,
    Json(body): Json<VerifyTokenRequest>,
) -> Result<Json<IdentityResponse>, GwError> {
    let identity = state.verifier.authenticate(&body.token).await?;

    Ok(Json(IdentityResponse {
        success: true,
        user: identity,
    }))
}

/// `POST /api/v1/auth/register`
///
/// Creates the directory record for a subject that the provider has already
/// issued a token to. The endpoint is public (the subject cannot pass the
/// admission pipeline without a record), so the token is verified inline.
#[instrument(skip_all, name = "gw.handlers.register")]
pub async fn register(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<RegisterRequest>,
) -> Result<Json<UserResponse>, GwError> {
    let token = bearer_token(&headers)?;
    let verification = state.provider.verify_token(token).await?;

    let existing = state
        .directory
        .get_user(&verification.subject)
        .await
        .map_err(|e| GwError::Directory(e.to_string()))?;
    if existing.is_some() {
        return Err(GwError::Conflict("User already registered".to_string()));
    }

    let now = Utc::now();
    let record = UserRecord {
        subject: verification.subject.clone(),
        email: body.email,
        display_name: body.display_name,
        role: body.role,
        status: AccountStatus::Active,
        avatar: None,
        department: None,
        location: None,
        manager_id: None,
        permissions: rbac::default_permissions(body.role),
        created_at: Some(now),
        updated_at: Some(now),
        last_seen_at: Some(now),
    };

    state
        .directory
        .create_user(&record)
        .await
        .map_err(|e| GwError::Directory(e.to_string()))?;

    info!(
        target: "gw.handlers.auth",
        subject = %record.subject,
        role = %record.role,
        "Registered new user"
    );

    Ok(Json(UserResponse {
        success: true,
        user: record,
    }))
}

/// `GET /api/v1/auth/me`
///
/// Echo the identity the pipeline attached.
pub async fn me(
    Extension(identity): Extension<AuthenticatedIdentity>,
) -> Json<IdentityResponse> {
    Json(IdentityResponse {
        success: true,
        user: identity,
    })
}

/// `POST /api/v1/auth/refresh`
///
/// Drop every cached identity entry for the subject and re-verify the
/// presented token, so role or profile changes take effect immediately
/// instead of at TTL expiry.
#[instrument(skip_all, name = "gw.handlers.refresh")]
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<AuthenticatedIdentity>,
    headers: HeaderMap,
) -> Result<Json<IdentityResponse>, GwError> {
    let token = bearer_token(&headers)?;

    state.verifier.invalidate_subject(&identity.subject).await;
    let fresh = state.verifier.authenticate(token).await?;

    Ok(Json(IdentityResponse {
        success: true,
        user: fresh,
    }))
}

/// `POST /api/v1/auth/logout`
///
/// Invalidate every cached identity entry for the subject. The token itself
/// stays valid at the provider; the next request re-verifies against it.
#[instrument(skip_all, name = "gw.handlers.logout")]
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<AuthenticatedIdentity>,
) -> Json<ApiMessage> {
    let removed = state.verifier.invalidate_subject(&identity.subject).await;

    info!(
        target: "gw.handlers.auth",
        subject = %identity.subject,
        removed,
        "Logged out"
    );

    Json(ApiMessage {
        success: true,
        message: "Logged out successfully".to_string(),
    })
}
