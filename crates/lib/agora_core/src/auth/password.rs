//! Password hashing via bcrypt.

use std::sync::LazyLock;

use super::{AuthError, AuthResult};

/// bcrypt cost factor.
const BCRYPT_COST: u32 = 10;

/// Hash a password with bcrypt.
pub fn hash_password(password: &str) -> AuthResult<String> {
    bcrypt::hash(password, BCRYPT_COST).map_err(|e| AuthError::Internal(format!("bcrypt hash: {e}")))
}

/// Check a password against a stored hash.
///
/// A hash that bcrypt cannot parse counts as a mismatch, so a corrupt row
/// looks exactly like a wrong password to the caller.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match bcrypt::verify(password, hash) {
        Ok(matches) => matches,
        Err(e) => {
            tracing::warn!(error = %e, "stored password hash is unreadable");
            false
        }
    }
}

/// Hash compared against when the username does not exist, so unknown users
/// cost the same bcrypt round as known ones.
static DUMMY_HASH: LazyLock<String> =
    LazyLock::new(|| bcrypt::hash("agora-dummy-password", BCRYPT_COST).unwrap_or_default());

/// Burn one bcrypt verification without a real hash.
pub(crate) fn verify_against_dummy(password: &str) {
    let _ = bcrypt::verify(password, &DUMMY_HASH);
}
