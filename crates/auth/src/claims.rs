use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use verenigingen_core::TenantId;

use crate::{PrincipalId, Role};

/// JWT claims model (transport-agnostic).
///
/// The minimal set of claims expected once a token has been decoded and its
/// signature verified by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject / principal identifier.
    pub sub: PrincipalId,

    /// Tenant (association) context for the token.
    pub tenant_id: TenantId,

    /// RBAC roles granted within the tenant context.
    pub roles: Vec<Role>,

    /// Issued-at timestamp.
    pub issued_at: DateTime<Utc>,

    /// Expiration timestamp.
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,

    #[error("token could not be decoded: {0}")]
    Decode(String),
}

/// Deterministically validate JWT claims.
///
/// Note: this validates the *claims* only. Signature verification / decoding
/// happens in [`JwtValidator`] implementations.
pub fn validate_claims(claims: &JwtClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.expires_at <= claims.issued_at {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.issued_at {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.expires_at {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

/// Verifies a raw token string and produces validated claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>)
    -> Result<JwtClaims, TokenValidationError>;
}

/// Claims as they appear on the wire (numeric `iat`/`exp` per RFC 7519).
#[derive(Debug, Serialize, Deserialize)]
struct WireClaims {
    sub: PrincipalId,
    tenant_id: TenantId,
    #[serde(default)]
    roles: Vec<Role>,
    iat: i64,
    exp: i64,
}

/// HS256 validator over a shared secret.
pub struct Hs256JwtValidator {
    key: DecodingKey,
}

impl Hs256JwtValidator {
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            key: DecodingKey::from_secret(&secret),
        }
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<JwtClaims, TokenValidationError> {
        // Time-window checks run through `validate_claims` against the caller's
        // clock, so the library's own exp handling is disabled.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let decoded = jsonwebtoken::decode::<WireClaims>(token, &self.key, &validation)
            .map_err(|e| TokenValidationError::Decode(e.to_string()))?;

        let wire = decoded.claims;
        let issued_at = Utc
            .timestamp_opt(wire.iat, 0)
            .single()
            .ok_or_else(|| TokenValidationError::Decode("invalid iat".to_string()))?;
        let expires_at = Utc
            .timestamp_opt(wire.exp, 0)
            .single()
            .ok_or_else(|| TokenValidationError::Decode("invalid exp".to_string()))?;

        let claims = JwtClaims {
            sub: wire.sub,
            tenant_id: wire.tenant_id,
            roles: wire.roles,
            issued_at,
            expires_at,
        };

        validate_claims(&claims, now)?;
        Ok(claims)
    }
}
