//! Role-based access control.
//!
//! Pure, synchronous functions over the static role hierarchy
//! BDE < AE < MANAGER < ADMIN. Used by the admission pipeline's
//! authorization stage and directly by handlers that gate on a capability.

use crate::models::{Role, RolePermissions};

impl Role {
    /// Numeric rank in the role hierarchy; higher rank means more privilege.
    pub fn rank(self) -> u8 {
        match self {
            Role::Bde => 0,
            Role::Ae => 1,
            Role::Manager => 2,
            Role::Admin => 3,
        }
    }
}

/// True iff `actor` is at least as privileged as `required`.
pub fn has_permission(actor: Role, required: Role) -> bool {
    actor.rank() >= required.rank()
}

/// Can see records owned by anyone, not just their own.
pub fn can_view_all_records(role: Role) -> bool {
    matches!(role, Role::Manager | Role::Admin)
}

/// Can create, update, and deactivate other accounts.
pub fn can_manage_accounts(role: Role) -> bool {
    matches!(role, Role::Admin)
}

/// Can open analytics views.
pub fn can_view_analytics(role: Role) -> bool {
    matches!(role, Role::Ae | Role::Manager | Role::Admin)
}

/// Can assign records to other users.
pub fn can_assign_records(role: Role) -> bool {
    matches!(role, Role::Manager | Role::Admin)
}

/// Can redraw territory boundaries.
pub fn can_manage_territories(role: Role) -> bool {
    matches!(role, Role::Admin)
}

/// Can send system-wide broadcast messages.
pub fn can_send_system_broadcasts(role: Role) -> bool {
    matches!(role, Role::Admin)
}

/// Capability block written onto a directory record at registration.
pub fn default_permissions(role: Role) -> RolePermissions {
    RolePermissions {
        can_view_all_records: can_view_all_records(role),
        can_manage_accounts: can_manage_accounts(role),
        can_view_analytics: can_view_analytics(role),
        can_assign_records: can_assign_records(role),
        can_manage_territories: can_manage_territories(role),
        can_send_system_broadcasts: can_send_system_broadcasts(role),
    }
}

/// Static mapping from route path to the minimum role it requires.
///
/// Consulted by the authorization stage. An entry matches the request path
/// exactly unless it ends with `/`, in which case it matches as a prefix
/// (longest prefix wins). The distinction matters for surfaces like
/// `/api/v1/users`, where the collection route is privileged but item routes
/// under it allow self-access enforced in the handler. A path with no entry
/// requires authentication but no particular role.
#[derive(Debug, Clone, Default)]
pub struct RouteRoleTable {
    entries: Vec<(String, Role)>,
}

impl RouteRoleTable {
    pub fn new(entries: Vec<(String, Role)>) -> Self {
        Self { entries }
    }

    /// Minimum role for `path`, if any entry matches.
    pub fn resolve(&self, path: &str) -> Option<Role> {
        if let Some((_, role)) = self.entries.iter().find(|(entry, _)| entry == path) {
            return Some(*role);
        }

        self.entries
            .iter()
            .filter(|(entry, _)| entry.ends_with('/') && path.starts_with(entry.as_str()))
            .max_by_key(|(entry, _)| entry.len())
            .map(|(_, role)| *role)
    }
}
