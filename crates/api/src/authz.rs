//! API-side authorization guard for commands.
//!
//! Enforced at the command boundary (before dispatch), keeping domain
//! aggregates and infra auth-agnostic.

use forgecrm_auth::{AuthzError, CommandAuthorization, Permission, authorize};

use crate::context::PrincipalContext;

/// Small helper wrapper to associate required permissions with a command.
pub struct CmdAuth<C> {
    pub inner: C,
    pub required: Vec<Permission>,
}

impl<C> CommandAuthorization for CmdAuth<C> {
    fn required_permissions(&self) -> &[Permission] {
        &self.required
    }
}

/// Check authorization for a command in the current request context.
///
/// Intended to be called **before** dispatching.
pub fn authorize_command<C: CommandAuthorization>(
    principal: &PrincipalContext,
    command: &C,
) -> Result<(), AuthzError> {
    let principal = principal.principal();
    for perm in command.required_permissions() {
        authorize(&principal, perm)?;
    }
    Ok(())
}
