use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::Permission;

/// Role identifier used for RBAC.
///
/// Roles are opaque strings at this layer; `default_role_permissions` maps
/// the well-known association roles to their permissions, and deployments
/// can substitute their own policy source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Built-in policy for the association roles.
///
/// - `admin`: everything.
/// - `membership-manager`: member, membership, chapter and dues
///   administration.
/// - `treasurer`: dues, invoicing, SEPA collection and accounting import.
/// - `chapter-board`: read access plus chapter/team/volunteer management.
pub fn default_role_permissions(role: &str) -> Vec<Permission> {
    match role {
        "admin" => vec![Permission::new("*")],
        "membership-manager" => vec![
            Permission::new("members.read"),
            Permission::new("members.register"),
            Permission::new("members.manage"),
            Permission::new("memberships.manage"),
            Permission::new("chapters.manage"),
            Permission::new("dues.schedule.manage"),
            Permission::new("dues.coverage.read"),
        ],
        "treasurer" => vec![
            Permission::new("members.read"),
            Permission::new("dues.schedule.manage"),
            Permission::new("dues.coverage.read"),
            Permission::new("invoices.manage"),
            Permission::new("sepa.mandate.manage"),
            Permission::new("sepa.batch.manage"),
            Permission::new("accounting.migrate"),
        ],
        "chapter-board" => vec![
            Permission::new("members.read"),
            Permission::new("chapters.manage"),
            Permission::new("volunteers.manage"),
        ],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_gets_wildcard() {
        let perms = default_role_permissions("admin");
        assert!(perms.iter().any(|p| p.is_wildcard()));
    }

    #[test]
    fn unknown_role_gets_nothing() {
        assert!(default_role_permissions("barista").is_empty());
    }

    #[test]
    fn treasurer_can_manage_batches_but_not_members() {
        let perms = default_role_permissions("treasurer");
        assert!(perms.iter().any(|p| p.as_str() == "sepa.batch.manage"));
        assert!(!perms.iter().any(|p| p.as_str() == "members.register"));
    }
}
