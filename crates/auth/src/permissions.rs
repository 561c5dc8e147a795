use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are modeled as opaque strings (e.g. "leads.approve").
/// The wildcard permission `"*"` means "allow all" without hardcoding every
/// domain permission into tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Well-known permissions used across the API surface.
pub mod known {
    use super::Permission;

    pub fn wildcard() -> Permission {
        Permission::new("*")
    }

    /// Approve leads in stages that require approval.
    pub fn leads_approve() -> Permission {
        Permission::new("leads.approve")
    }

    /// See every lead, not just owned/collaborated ones.
    pub fn leads_view_all() -> Permission {
        Permission::new("leads.view_all")
    }

    /// See every activity, not just assigned ones.
    pub fn activities_view_all() -> Permission {
        Permission::new("activities.view_all")
    }

    /// Create/update products and trigger catalog maintenance.
    pub fn products_manage() -> Permission {
        Permission::new("products.manage")
    }

    /// Run the external inventory sync.
    pub fn catalog_sync() -> Permission {
        Permission::new("catalog.sync")
    }

    /// Query the audit trail.
    pub fn audit_view() -> Permission {
        Permission::new("audit.view")
    }
}
