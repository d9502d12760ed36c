//! Stateless credential issuance and verification.
//!
//! Access and refresh tokens are HS256-signed JWTs sharing one principal
//! shape; verification is pure CPU and needs no storage. There is no
//! server-side revocation: a refresh mints a fresh pair without
//! invalidating the old one.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AppError;

/// Access credential lifetime.
pub const ACCESS_TTL_MINUTES: i64 = 360;
/// Refresh credential lifetime.
pub const REFRESH_TTL_DAYS: i64 = 90;

/// Role levels: 1 read, 2 act, 3 admin, 5 superuser.
pub const LEVEL_READ: u8 = 1;
pub const LEVEL_ACT: u8 = 2;
pub const LEVEL_ADMIN: u8 = 3;
pub const LEVEL_SUPERUSER: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Numeric user id, stringly encoded per JWT convention.
    pub sub: String,
    pub username: String,
    pub level: u8,
    pub tenant: String,
    pub typ: TokenKind,
    pub iat: i64,
    pub exp: i64,
}

/// The authenticated subject carried through a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i64,
    pub username: String,
    pub level: u8,
    pub tenant: String,
}

impl Principal {
    pub fn require_level(&self, required: u8) -> Result<(), AppError> {
        if self.level < required {
            return Err(AppError::Forbidden(format!(
                "level {} required",
                required
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

pub struct CredentialService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl CredentialService {
    pub fn new(secret: &str) -> Self {
        Self::with_lifetimes(
            secret,
            Duration::minutes(ACCESS_TTL_MINUTES),
            Duration::days(REFRESH_TTL_DAYS),
        )
    }

    /// Lifetimes are injectable so expiry behavior can be exercised in
    /// tests without waiting out the real windows.
    pub fn with_lifetimes(secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl,
            refresh_ttl,
        }
    }

    /// Produce a signed access + refresh pair for the principal.
    pub fn issue_pair(&self, principal: &Principal) -> Result<TokenPair, AppError> {
        Ok(TokenPair {
            access_token: self.sign(principal, TokenKind::Access, self.access_ttl)?,
            refresh_token: self.sign(principal, TokenKind::Refresh, self.refresh_ttl)?,
        })
    }

    fn sign(
        &self,
        principal: &Principal,
        kind: TokenKind,
        ttl: Duration,
    ) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: principal.user_id.to_string(),
            username: principal.username.clone(),
            level: principal.level,
            tenant: principal.tenant.clone(),
            typ: kind,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("failed to sign credential: {}", e)))
    }

    /// Verify an access token and enforce the route's required level.
    pub fn verify_access(&self, token: &str, required_level: u8) -> Result<Principal, AppError> {
        self.verify(token, TokenKind::Access, required_level)
    }

    /// Verify a refresh token; level is not re-checked here, the fresh
    /// pair carries whatever the tenant database currently says.
    pub fn verify_refresh(&self, token: &str) -> Result<Principal, AppError> {
        self.verify(token, TokenKind::Refresh, 0)
    }

    fn verify(
        &self,
        token: &str,
        expected_kind: TokenKind,
        required_level: u8,
    ) -> Result<Principal, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    AppError::Unauthenticated("credential expired".to_string())
                }
                _ => AppError::Unauthenticated("invalid credential".to_string()),
            }
        })?;

        let claims = data.claims;
        if claims.typ != expected_kind {
            return Err(AppError::Unauthenticated(
                "wrong credential type".to_string(),
            ));
        }

        let user_id: i64 = claims
            .sub
            .parse()
            .map_err(|_| AppError::Unauthenticated("invalid credential".to_string()))?;

        let principal = Principal {
            user_id,
            username: claims.username,
            level: claims.level,
            tenant: claims.tenant,
        };
        principal.require_level(required_level)?;
        Ok(principal)
    }
}

/// Hex SHA-256 digest used for stored password comparison.
pub fn password_digest(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal() -> Principal {
        Principal {
            user_id: 7,
            username: "basir".to_string(),
            level: LEVEL_ADMIN,
            tenant: "gallerya".to_string(),
        }
    }

    #[test]
    fn round_trip_preserves_principal() {
        let service = CredentialService::new("secret");
        let pair = service.issue_pair(&principal()).unwrap();
        let verified = service.verify_access(&pair.access_token, LEVEL_READ).unwrap();
        assert_eq!(verified, principal());
    }

    #[test]
    fn insufficient_level_is_forbidden() {
        let service = CredentialService::new("secret");
        let mut p = principal();
        p.level = LEVEL_READ;
        let pair = service.issue_pair(&p).unwrap();
        let err = service
            .verify_access(&pair.access_token, LEVEL_ADMIN)
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let service = CredentialService::new("secret");
        let pair = service.issue_pair(&principal()).unwrap();
        assert!(service
            .verify_access(&pair.refresh_token, LEVEL_READ)
            .is_err());
        assert!(service.verify_refresh(&pair.access_token).is_err());
    }

    #[test]
    fn tampered_token_is_rejected() {
        let service = CredentialService::new("secret");
        let other = CredentialService::new("different-secret");
        let pair = other.issue_pair(&principal()).unwrap();
        let err = service
            .verify_access(&pair.access_token, LEVEL_READ)
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated(_)));
    }

    #[test]
    fn expired_access_token_is_rejected() {
        let service = CredentialService::with_lifetimes(
            "secret",
            Duration::seconds(-5),
            Duration::days(1),
        );
        let pair = service.issue_pair(&principal()).unwrap();
        let err = service
            .verify_access(&pair.access_token, LEVEL_READ)
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated(_)));
    }

    #[test]
    fn two_refreshes_yield_independent_access_tokens() {
        let service = CredentialService::new("secret");
        let pair = service.issue_pair(&principal()).unwrap();
        let p = service.verify_refresh(&pair.refresh_token).unwrap();
        let first = service.issue_pair(&p).unwrap();
        let second = service.issue_pair(&p).unwrap();
        assert!(service.verify_access(&first.access_token, LEVEL_READ).is_ok());
        assert!(service
            .verify_access(&second.access_token, LEVEL_READ)
            .is_ok());
    }

    #[test]
    fn password_digest_is_stable_hex() {
        let d = password_digest("pw");
        assert_eq!(d.len(), 64);
        assert_eq!(d, password_digest("pw"));
        assert_ne!(d, password_digest("pw2"));
    }
}
