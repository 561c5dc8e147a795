use std::collections::HashSet;

use thiserror::Error;

use forgecrm_core::UserId;

use crate::{Permission, Role};

/// A fully resolved principal for authorization decisions.
///
/// Construction is decoupled from storage and transport: the API derives
/// principals from verified claims plus the policy map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

impl Principal {
    pub fn has_permission(&self, required: &Permission) -> bool {
        let perms: HashSet<&str> = self.permissions.iter().map(|p| p.as_str()).collect();
        perms.contains("*") || perms.contains(required.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Command-side authorization contract (checked at the command boundary).
///
/// Implement this on commands that require permissions.
/// The API layer enforces these requirements before dispatching.
pub trait CommandAuthorization {
    fn required_permissions(&self) -> &[Permission];
}

/// Authorize a principal for a single permission.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if principal.has_permission(required) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::known;

    fn principal(perms: Vec<Permission>) -> Principal {
        Principal {
            user_id: UserId::new(),
            roles: vec![],
            permissions: perms,
        }
    }

    #[test]
    fn wildcard_grants_everything() {
        let p = principal(vec![known::wildcard()]);
        assert!(authorize(&p, &known::leads_approve()).is_ok());
        assert!(authorize(&p, &known::catalog_sync()).is_ok());
    }

    #[test]
    fn exact_permission_grants_only_itself() {
        let p = principal(vec![known::leads_view_all()]);
        assert!(authorize(&p, &known::leads_view_all()).is_ok());
        assert_eq!(
            authorize(&p, &known::leads_approve()),
            Err(AuthzError::Forbidden("leads.approve".to_string()))
        );
    }
}
