//! JWT token issuance and validation.
//!
//! Access tokens carry `sub` (principal ID) and `rid` (role ID) and live for
//! five minutes. Refresh tokens carry `sub` and a random `jti` and live for
//! 720 hours. Both are HMAC-signed with one process-wide secret.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{info, warn};
use uuid::Uuid;

use super::{AuthError, AuthResult};
use crate::models::auth::{AccessClaims, RefreshClaims};

/// `iss` claim of every token this service mints.
pub const ISSUER: &str = "agora-api";

/// Access token lifetime: 5 minutes.
pub const ACCESS_TOKEN_TTL_SECS: i64 = 5 * 60;

/// Refresh token lifetime: 720 hours.
pub const REFRESH_TOKEN_TTL_SECS: i64 = 720 * 60 * 60;

/// Only the HMAC family is accepted. Anything else in the header (`none`,
/// RSA, EC) is rejected before the signature is looked at.
const ACCEPTED_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// A freshly minted refresh token and the metadata needed to persist it.
#[derive(Debug, Clone)]
pub struct IssuedRefreshToken {
    pub token: String,
    pub jti: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Signing and verification keys derived from the shared secret.
///
/// Built once at startup and shared read-only.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl std::fmt::Debug for TokenKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenKeys").finish_non_exhaustive()
    }
}

impl TokenKeys {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    /// Sign an access token for `principal_id` holding `role_id`.
    pub fn issue_access_token(&self, principal_id: Uuid, role_id: Uuid) -> AuthResult<String> {
        let now = Utc::now();
        self.encode_access(&AccessClaims {
            sub: principal_id.to_string(),
            rid: role_id.to_string(),
            iss: ISSUER.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(ACCESS_TOKEN_TTL_SECS)).timestamp(),
        })
    }

    /// Sign a refresh token for `principal_id` with a fresh token ID.
    pub fn issue_refresh_token(&self, principal_id: Uuid) -> AuthResult<IssuedRefreshToken> {
        let issued_at = Utc::now();
        let expires_at = issued_at + Duration::seconds(REFRESH_TOKEN_TTL_SECS);
        let jti = Uuid::new_v4();
        let token = self.encode_refresh(&RefreshClaims {
            sub: principal_id.to_string(),
            jti: jti.to_string(),
            iss: ISSUER.to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        })?;
        Ok(IssuedRefreshToken {
            token,
            jti,
            issued_at,
            expires_at,
        })
    }

    /// Sign arbitrary access claims.
    pub fn encode_access(&self, claims: &AccessClaims) -> AuthResult<String> {
        self.sign(claims)
    }

    /// Sign arbitrary refresh claims.
    pub fn encode_refresh(&self, claims: &RefreshClaims) -> AuthResult<String> {
        self.sign(claims)
    }

    fn sign<C: Serialize>(&self, claims: &C) -> AuthResult<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))
    }

    /// Verify an access token against the current time.
    pub fn validate_access(&self, token: &str) -> AuthResult<AccessClaims> {
        self.validate_access_at(token, Utc::now().timestamp())
    }

    /// Verify an access token as of `now` (unix seconds).
    pub fn validate_access_at(&self, token: &str, now: i64) -> AuthResult<AccessClaims> {
        let claims: AccessClaims = self.verify_signature(token)?;
        check_expiry(claims.exp, now)?;
        Ok(claims)
    }

    /// Verify a refresh token against the current time.
    pub fn validate_refresh(&self, token: &str) -> AuthResult<RefreshClaims> {
        self.validate_refresh_at(token, Utc::now().timestamp())
    }

    /// Verify a refresh token as of `now` (unix seconds).
    pub fn validate_refresh_at(&self, token: &str, now: i64) -> AuthResult<RefreshClaims> {
        let claims: RefreshClaims = self.verify_signature(token)?;
        check_expiry(claims.exp, now)?;
        Ok(claims)
    }

    /// Verify a refresh token's signature and claims, ignoring expiry.
    ///
    /// Used by logout, where an expired but authentic token is still worth
    /// blacklisting.
    pub fn decode_refresh_unchecked_expiry(&self, token: &str) -> AuthResult<RefreshClaims> {
        self.verify_signature(token)
    }

    /// Algorithm, signature, issuer and required-claim checks. Expiry is
    /// checked by the caller so the boundary is ours, not the library's leeway.
    fn verify_signature<C: DeserializeOwned>(&self, token: &str) -> AuthResult<C> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = ACCEPTED_ALGORITHMS.to_vec();
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        validation.set_issuer(&[ISSUER]);

        decode::<C>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::TokenInvalid(e.to_string()),
            })
    }
}

/// A token whose `exp` equals `now` is already expired.
fn check_expiry(exp: i64, now: i64) -> AuthResult<()> {
    if exp <= now {
        return Err(AuthError::TokenExpired);
    }
    Ok(())
}

/// Environment variables checked for the signing secret, in order.
const SECRET_ENV_VARS: [&str; 2] = ["JWT_SECRET", "AUTH_SECRET"];

/// Resolve the JWT secret from the environment, falling back to a secret
/// persisted under the user data directory.
pub fn resolve_jwt_secret() -> String {
    SECRET_ENV_VARS
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|secret| !secret.is_empty())
        .unwrap_or_else(|| persisted_secret(&jwt_secret_path()))
}

/// Read the secret at `path`, or generate one and try to store it there.
///
/// A secret that cannot be stored only lives as long as the process, so
/// every token it signs stops validating after a restart.
fn persisted_secret(path: &Path) -> String {
    if let Ok(existing) = std::fs::read_to_string(path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    match write_secret(path, &secret) {
        Ok(()) => info!(path = %path.display(), "generated new JWT secret"),
        Err(e) => warn!(
            path = %path.display(),
            error = %e,
            "could not persist generated JWT secret; tokens will not survive a restart"
        ),
    }
    secret
}

fn write_secret(path: &Path, secret: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, secret)
}

fn jwt_secret_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("agora")
        .join("jwt-secret")
}
