//! Gateway data models.
//!
//! Contains the identity types produced by the admission pipeline, the user
//! directory document shape, and the request/response bodies of the API
//! surface.

use chrono::{DateTime, Utc};
use common::types::SubjectId;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Schema version written into every cached identity entry.
///
/// Readers treat any other version as a cache miss, so the on-wire format can
/// evolve without ambiguous type-sniffing on read.
pub const IDENTITY_SCHEMA_VERSION: u32 = 1;

/// User role enumeration.
///
/// Roles form a total order used by the RBAC evaluator:
/// BDE < AE < MANAGER < ADMIN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Business development executive.
    Bde,

    /// Account executive.
    Ae,

    /// Team manager.
    Manager,

    /// System administrator.
    Admin,
}

impl Role {
    /// Returns the string representation of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Bde => "bde",
            Role::Ae => "ae",
            Role::Manager => "manager",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bde" => Ok(Role::Bde),
            "ae" => Ok(Role::Ae),
            "manager" => Ok(Role::Manager),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account status of a directory record.
///
/// An `Inactive` account must never reach a handler; the admission pipeline
/// rejects it after the directory lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    /// Account is active and may use the system.
    Active,

    /// Account is deactivated; requests are rejected with 403.
    Inactive,

    /// Account holder is on leave; requests are still admitted.
    OnLeave,
}

impl AccountStatus {
    /// Returns the string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Inactive => "inactive",
            AccountStatus::OnLeave => "onleave",
        }
    }
}

/// Named capability flags stored on a directory record.
///
/// Derived purely from the role at registration time; see
/// [`crate::auth::rbac::default_permissions`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RolePermissions {
    pub can_view_all_records: bool,
    pub can_manage_accounts: bool,
    pub can_view_analytics: bool,
    pub can_assign_records: bool,
    pub can_manage_territories: bool,
    pub can_send_system_broadcasts: bool,
}

/// User profile document as stored in the user directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// Provider-issued subject identifier.
    pub subject: SubjectId,

    /// Primary email address.
    pub email: String,

    /// Display name shown in the UI.
    pub display_name: String,

    /// Assigned role.
    pub role: Role,

    /// Account status.
    pub status: AccountStatus,

    /// Avatar URL, if set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,

    /// Department, if set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,

    /// Office location, if set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Subject id of this user's manager, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager_id: Option<SubjectId>,

    /// Capability flags derived from the role at registration.
    #[serde(default)]
    pub permissions: RolePermissions,

    /// Record creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// Last record mutation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Last time the subject authenticated through the gateway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen_at: Option<DateTime<Utc>>,
}

/// Authenticated identity attached to a request by the admission pipeline.
///
/// Request-scoped and immutable: the auth middleware inserts it into the
/// request extensions, handlers and the authorization stage read it. It is
/// never stored beyond the cache entry that seeded it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedIdentity {
    /// Provider-issued subject identifier.
    pub subject: SubjectId,

    /// Role at authentication time.
    pub role: Role,

    /// Account status at authentication time.
    pub status: AccountStatus,

    /// Email from the directory record.
    pub email: String,

    /// Display name from the directory record.
    pub display_name: String,

    /// Raw claims as returned by the identity provider.
    #[serde(default)]
    pub claims: serde_json::Map<String, serde_json::Value>,
}

impl AuthenticatedIdentity {
    /// Build an identity from a directory record and the provider claims.
    pub fn from_record(
        record: &UserRecord,
        claims: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            subject: record.subject.clone(),
            role: record.role,
            status: record.status,
            email: record.email.clone(),
            display_name: record.display_name.clone(),
            claims,
        }
    }
}

/// Versioned envelope for identity snapshots in the shared cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedIdentityEntry {
    /// Serialization schema version; see [`IDENTITY_SCHEMA_VERSION`].
    pub schema_version: u32,

    /// Epoch seconds at which the entry was written.
    pub cached_at: i64,

    /// The cached identity snapshot.
    pub identity: AuthenticatedIdentity,
}

impl CachedIdentityEntry {
    /// Wrap an identity in the current envelope version.
    pub fn new(identity: AuthenticatedIdentity, cached_at: i64) -> Self {
        Self {
            schema_version: IDENTITY_SCHEMA_VERSION,
            cached_at,
            identity,
        }
    }

    /// True if the entry was written with the current schema version.
    pub fn is_current(&self) -> bool {
        self.schema_version == IDENTITY_SCHEMA_VERSION
    }
}

// ============================================================================
// API request/response bodies
// ============================================================================

/// Generic acknowledgement / error body: `{success, message}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiMessage {
    pub success: bool,
    pub message: String,
}

/// Body of `POST /api/v1/auth/verify-token`.
#[derive(Debug, Deserialize)]
pub struct VerifyTokenRequest {
    pub token: String,
}

/// Successful identity response: `{success, user}`.
#[derive(Debug, Serialize)]
pub struct IdentityResponse {
    pub success: bool,
    pub user: AuthenticatedIdentity,
}

/// Body of `POST /api/v1/auth/register`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub display_name: String,
    #[serde(default = "default_register_role")]
    pub role: Role,
}

fn default_register_role() -> Role {
    Role::Bde
}

/// Response carrying a full directory record.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub success: bool,
    pub user: UserRecord,
}

/// Response of `GET /api/v1/users`.
#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub success: bool,
    pub users: Vec<UserRecord>,
    pub total: usize,
}

/// Partial update body for `PATCH /api/v1/users/:id`.
///
/// Only provided fields are written to the directory record. Role and status
/// changes are administrative and gated on `can_manage_accounts`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserUpdate {
    pub display_name: Option<String>,
    pub avatar: Option<String>,
    pub department: Option<String>,
    pub location: Option<String>,
    pub manager_id: Option<SubjectId>,
    pub role: Option<Role>,
    pub status: Option<AccountStatus>,
}

impl UserUpdate {
    /// True if the update touches administrative fields (role or status).
    pub fn is_administrative(&self) -> bool {
        self.role.is_some() || self.status.is_some()
    }

    /// Render the update as a directory patch document (camelCase keys,
    /// only the provided fields).
    pub fn to_patch(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut patch = serde_json::Map::new();
        if let Some(v) = &self.display_name {
            patch.insert("displayName".to_string(), serde_json::json!(v));
        }
        if let Some(v) = &self.avatar {
            patch.insert("avatar".to_string(), serde_json::json!(v));
        }
        if let Some(v) = &self.department {
            patch.insert("department".to_string(), serde_json::json!(v));
        }
        if let Some(v) = &self.location {
            patch.insert("location".to_string(), serde_json::json!(v));
        }
        if let Some(v) = &self.manager_id {
            patch.insert("managerId".to_string(), serde_json::json!(v));
        }
        if let Some(v) = &self.role {
            patch.insert("role".to_string(), serde_json::json!(v));
        }
        if let Some(v) = &self.status {
            patch.insert("status".to_string(), serde_json::json!(v));
        }
        patch
    }
}

/// Readiness check response, returned by `/ready`.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    /// Service readiness status ("ready" or "not_ready").
    pub status: &'static str,

    /// Shared cache status ("available" or "degraded").
    ///
    /// The cache is a soft dependency: a degraded cache never makes the
    /// service unready, it only disables the identity-cache and quota
    /// optimizations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<&'static str>,

    /// Identity provider configuration status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_provider: Option<&'static str>,

    /// Error message (generic, no infrastructure details).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
