//! Role → permission mapping and record visibility.
//!
//! Policy is code-defined: the role set is small and stable (admin, manager,
//! sales rep), and keeping it here makes authorization decisions reviewable in
//! one place instead of spread across a permissions table.

use forgecrm_core::UserId;

use crate::permissions::known;
use crate::{Permission, Principal, Role};

/// Resolve the effective permissions for a role set.
pub fn permissions_for_roles(roles: &[Role]) -> Vec<Permission> {
    if roles.iter().any(|r| r.as_str() == "admin") {
        return vec![known::wildcard()];
    }

    let mut perms = Vec::new();
    for role in roles {
        match role.as_str() {
            "manager" => {
                perms.push(known::leads_approve());
                perms.push(known::leads_view_all());
                perms.push(known::activities_view_all());
                perms.push(known::products_manage());
                perms.push(known::catalog_sync());
                perms.push(known::audit_view());
            }
            // Sales reps operate on their own records; list filtering does the
            // narrowing, so no blanket permissions are granted here.
            "sales_rep" => {}
            _ => {}
        }
    }
    perms.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    perms.dedup();
    perms
}

/// Record-level visibility derived from a principal.
///
/// `Everything` sees all records; `Own(user)` is narrowed to records the user
/// owns, collaborates on, or is assigned to. This is how "sales reps see their
/// own pipeline" expresses itself on read-model queries.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Visibility {
    Everything,
    Own(UserId),
}

impl Visibility {
    /// Compute visibility for a principal given the widening permission
    /// (e.g. `leads.view_all`).
    pub fn for_principal(principal: &Principal, view_all: &Permission) -> Self {
        if principal.has_permission(view_all) {
            Visibility::Everything
        } else {
            Visibility::Own(principal.user_id)
        }
    }

    /// Whether a record owned/assigned as `involved` is visible.
    pub fn allows(&self, involved: &[Option<UserId>]) -> bool {
        match self {
            Visibility::Everything => true,
            Visibility::Own(user) => involved.iter().flatten().any(|u| u == user),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_collapses_to_wildcard() {
        let perms = permissions_for_roles(&[Role::admin(), Role::manager()]);
        assert_eq!(perms, vec![known::wildcard()]);
    }

    #[test]
    fn manager_gets_approval_and_view_all() {
        let perms = permissions_for_roles(&[Role::manager()]);
        assert!(perms.contains(&known::leads_approve()));
        assert!(perms.contains(&known::leads_view_all()));
        assert!(!perms.contains(&known::wildcard()));
    }

    #[test]
    fn sales_rep_visibility_is_own_records_only() {
        let user = UserId::new();
        let principal = Principal {
            user_id: user,
            roles: vec![Role::sales_rep()],
            permissions: permissions_for_roles(&[Role::sales_rep()]),
        };

        let vis = Visibility::for_principal(&principal, &known::leads_view_all());
        assert_eq!(vis, Visibility::Own(user));
        assert!(vis.allows(&[Some(user), None]));
        assert!(!vis.allows(&[Some(UserId::new())]));
    }
}
