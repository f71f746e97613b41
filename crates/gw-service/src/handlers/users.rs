//! User directory pass-through endpoints.
//!
//! These handlers stay thin: authorization decisions use the RBAC
//! evaluator, data access goes straight to the directory, and every
//! mutation invalidates the subject's cached identities (write-through
//! invalidation, the entries are deleted rather than refreshed).

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use chrono::Utc;
use common::types::SubjectId;
use std::sync::Arc;
use tracing::instrument;

use crate::auth::rbac;
use crate::errors::GwError;
use crate::models::{
    AuthenticatedIdentity, Role, UserListResponse, UserResponse, UserUpdate,
};
use crate::routes::AppState;

/// `GET /api/v1/users`
///
/// The route role table gates this collection route at MANAGER.
#[instrument(skip_all, name = "gw.handlers.list_users")]
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Extension(_identity): Extension<AuthenticatedIdentity>,
) -> Result<Json<UserListResponse>, GwError> {
    let users = state
        .directory
        .list_users()
        .await
        .map_err(|e| GwError::Directory(e.to_string()))?;

    let total = users.len();
    Ok(Json(UserListResponse {
        success: true,
        users,
        total,
    }))
}

/// `GET /api/v1/users/:id`
///
/// Self-access is always allowed; reading someone else's record requires
/// MANAGER or above.
#[instrument(skip_all, name = "gw.handlers.get_user", fields(subject = %subject))]
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<AuthenticatedIdentity>,
    Path(subject): Path<SubjectId>,
) -> Result<Json<UserResponse>, GwError> {
    if subject != identity.subject && !rbac::has_permission(identity.role, Role::Manager) {
        return Err(GwError::InsufficientRole {
            required: Role::Manager,
        });
    }

    let record = state
        .directory
        .get_user(&subject)
        .await
        .map_err(|e| GwError::Directory(e.to_string()))?
        .ok_or_else(|| GwError::NotFound("User not found".to_string()))?;

    Ok(Json(UserResponse {
        success: true,
        user: record,
    }))
}

/// `PATCH /api/v1/users/:id`
///
/// Users may update their own non-administrative fields; touching another
/// user's record, or the role/status fields, requires account management
/// capability (ADMIN). Successful updates invalidate the subject's cached
/// identities so the change is visible on the next request.
#[instrument(skip_all, name = "gw.handlers.update_user", fields(subject = %subject))]
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<AuthenticatedIdentity>,
    Path(subject): Path<SubjectId>,
    Json(update): Json<UserUpdate>,
) -> Result<Json<UserResponse>, GwError> {
    let manages_accounts = rbac::can_manage_accounts(identity.role);

    if subject != identity.subject && !manages_accounts {
        return Err(GwError::InsufficientRole {
            required: Role::Admin,
        });
    }
    if update.is_administrative() && !manages_accounts {
        return Err(GwError::InsufficientRole {
            required: Role::Admin,
        });
    }

    let mut patch = update.to_patch();
    patch.insert(
        "updatedAt".to_string(),
        serde_json::json!(Utc::now().to_rfc3339()),
    );

    let record = state
        .directory
        .update_user(&subject, &patch)
        .await
        .map_err(|e| GwError::Directory(e.to_string()))?
        .ok_or_else(|| GwError::NotFound("User not found".to_string()))?;

    // The directory record changed; stale cached identities must not outlive
    // the mutation.
    state.verifier.invalidate_subject(&subject).await;

    Ok(Json(UserResponse {
        success: true,
        user: record,
    }))
}
