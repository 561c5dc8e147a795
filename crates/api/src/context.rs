use forgecrm_auth::{Permission, Principal, Role, Visibility, permissions_for_roles};
use forgecrm_core::UserId;

/// Principal context for a request (authenticated identity + roles).
///
/// Built by the auth middleware from verified claims; permissions come from
/// the policy map, not from the token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    user_id: UserId,
    roles: Vec<Role>,
    permissions: Vec<Permission>,
}

impl PrincipalContext {
    pub fn new(user_id: UserId, roles: Vec<Role>) -> Self {
        let permissions = permissions_for_roles(&roles);
        Self {
            user_id,
            roles,
            permissions,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn principal(&self) -> Principal {
        Principal {
            user_id: self.user_id,
            roles: self.roles.clone(),
            permissions: self.permissions.clone(),
        }
    }

    /// Record visibility for list endpoints gated by `view_all`.
    pub fn visibility(&self, view_all: &Permission) -> Visibility {
        Visibility::for_principal(&self.principal(), view_all)
    }
}
