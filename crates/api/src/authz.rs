//! API-side authorization guard for commands.
//!
//! Enforces authorization at the command boundary (before dispatch), while
//! keeping domain aggregates and infra auth-agnostic.

use verenigingen_auth::{
    AuthzError, CommandAuthorization, Principal, TenantMembership, authorize,
    default_role_permissions,
};

use crate::context::{PrincipalContext, TenantContext};

/// Check authorization for a command in the current request context.
///
/// This is intended to be called **before** dispatching a command.
pub fn authorize_command<C: CommandAuthorization>(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    command: &C,
) -> Result<(), AuthzError> {
    let permissions = principal
        .roles()
        .iter()
        .flat_map(|r| default_role_permissions(r.as_str()))
        .collect();

    let membership = TenantMembership {
        tenant_id: tenant.tenant_id(),
        roles: principal.roles().to_vec(),
        permissions,
    };

    let principal = Principal {
        principal_id: principal.principal_id(),
        active_tenant_id: tenant.tenant_id(),
        membership,
    };

    for perm in command.required_permissions() {
        authorize(&principal, perm)?;
    }

    Ok(())
}
