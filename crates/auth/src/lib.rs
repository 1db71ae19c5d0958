//! `verenigingen-auth` — pure authentication/authorization boundary.
//!
//! Association staff authenticate with JWTs scoped to one tenant
//! (association); roles such as membership manager or treasurer resolve to
//! permissions checked at the command boundary. This crate is intentionally
//! decoupled from HTTP and storage.

pub mod authorize;
pub mod claims;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, CommandAuthorization, Principal, authorize};
pub use claims::{
    Hs256JwtValidator, JwtClaims, JwtValidator, TokenValidationError, validate_claims,
};
pub use permissions::Permission;
pub use principal::{PrincipalId, TenantMembership};
pub use roles::{Role, default_role_permissions};
