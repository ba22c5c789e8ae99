//! Authentication and authorization logic.
//!
//! Password hashing, JWT issuance and validation, refresh token revocation,
//! the register/login/refresh/logout flows and the authorization gates that
//! `agora_api` wires into its middleware.

pub mod gate;
pub mod jwt;
pub mod password;
pub mod purge;
pub mod revocation;
pub mod roles;
pub mod service;

#[cfg(test)]
mod testing;

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::cache::CacheError;
use crate::store::StoreError;

pub use self::jwt::TokenKeys;
pub use self::revocation::{BlacklistPolicy, RevocationStore};
pub use self::roles::DefaultRoles;
pub use self::service::{AuthService, IssuedSession};

/// Authentication errors.
///
/// Every failure of the auth core is one of these kinds; the HTTP boundary
/// maps each to a status code.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown username or wrong password. Deliberately does not say which.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Token expired")]
    TokenExpired,

    /// Malformed token, wrong algorithm, bad signature or missing claim.
    #[error("Invalid token: {0}")]
    TokenInvalid(String),

    /// Token found in the revocation blacklist.
    #[error("Token revoked")]
    TokenRevoked,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Uniqueness violation on registration.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for auth operations.
pub type AuthResult<T> = Result<T, AuthError>;

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(m) => AuthError::NotFound(m),
            StoreError::Conflict(m) => AuthError::Conflict(m),
            StoreError::Unavailable(m) => AuthError::StorageUnavailable(m),
        }
    }
}

impl From<CacheError> for AuthError {
    fn from(e: CacheError) -> Self {
        AuthError::StorageUnavailable(e.to_string())
    }
}

/// Await a store call under `deadline`, mapping an elapsed deadline to
/// `StorageUnavailable`. Dropping the returned future cancels the call.
pub(crate) async fn within<T, E>(
    deadline: Duration,
    fut: impl Future<Output = Result<T, E>>,
) -> AuthResult<T>
where
    AuthError: From<E>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result.map_err(AuthError::from),
        Err(_) => Err(AuthError::StorageUnavailable(format!(
            "call exceeded {deadline:?}"
        ))),
    }
}
