//! Route-level authorization middleware.
//!
//! Routes declare a minimum required role through the
//! [`RouteRoleTable`](crate::auth::RouteRoleTable); this stage looks the
//! request path up and compares against the authenticated identity's role.
//! Declarative table lookup replaces per-handler wrapping: adding a gate is
//! a configuration change, not a code change.
//!
//! Runs after `require_identity`; a matching table entry on a request that
//! somehow lacks an identity is rejected as unauthenticated rather than
//! skipped.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::auth::rbac;
use crate::errors::GwError;
use crate::models::AuthenticatedIdentity;
use crate::routes::AppState;

/// Minimum-role gate for protected routes.
#[instrument(skip_all, name = "gw.middleware.authorize")]
pub async fn enforce_min_role(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, GwError> {
    if let Some(required) = state.route_roles.resolve(req.uri().path()) {
        let identity = req
            .extensions()
            .get::<AuthenticatedIdentity>()
            .ok_or(GwError::MissingToken)?;

        if !rbac::has_permission(identity.role, required) {
            debug!(
                target: "gw.middleware.authorize",
                subject = %identity.subject,
                actor_role = %identity.role,
                required_role = %required,
                path = req.uri().path(),
                "Request rejected by route role gate"
            );
            return Err(GwError::InsufficientRole { required });
        }
    }

    Ok(next.run(req).await)
}
