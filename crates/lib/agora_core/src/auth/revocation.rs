//! Refresh token revocation backed by a key-value cache.
//!
//! Key layout:
//!
//! | Key                     | Value              | TTL   |
//! |-------------------------|--------------------|-------|
//! | `blacklist:<token>`     | `"true"`           | 720h  |
//! | `refreshToken:<userID>` | current refresh    | 120h  |
//! | `user:<userID>`         | principal JSON     | 24h   |
//! | `role:<roleID>`         | role type name     | 48h   |

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};
use uuid::Uuid;

use super::{AuthError, AuthResult, within};
use crate::cache::KeyValueCache;
use crate::models::auth::Principal;

/// Blacklist entries outlive any refresh token they could name.
pub const BLACKLIST_TTL: Duration = Duration::from_secs(720 * 60 * 60);

pub const CURRENT_REFRESH_TTL: Duration = Duration::from_secs(120 * 60 * 60);

pub const PRINCIPAL_SNAPSHOT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

pub const ROLE_NAME_TTL: Duration = Duration::from_secs(48 * 60 * 60);

/// Default deadline for a single cache call.
pub const DEFAULT_CACHE_DEADLINE: Duration = Duration::from_secs(2);

/// What a blacklist check answers when the cache cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlacklistPolicy {
    /// Treat the token as not blacklisted and log the failure.
    #[default]
    FailOpen,
    /// Reject the token as invalid.
    FailClosed,
}

fn blacklist_key(token: &str) -> String {
    format!("blacklist:{token}")
}

fn current_refresh_key(user_id: Uuid) -> String {
    format!("refreshToken:{user_id}")
}

fn principal_key(user_id: Uuid) -> String {
    format!("user:{user_id}")
}

fn role_name_key(role_id: Uuid) -> String {
    format!("role:{role_id}")
}

/// Revocation store and session cache.
#[derive(Clone)]
pub struct RevocationStore {
    cache: Arc<dyn KeyValueCache>,
    policy: BlacklistPolicy,
    deadline: Duration,
}

impl RevocationStore {
    pub fn new(cache: Arc<dyn KeyValueCache>) -> Self {
        Self {
            cache,
            policy: BlacklistPolicy::default(),
            deadline: DEFAULT_CACHE_DEADLINE,
        }
    }

    pub fn with_policy(mut self, policy: BlacklistPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn policy(&self) -> BlacklistPolicy {
        self.policy
    }

    /// Blacklist a refresh token. Repeating the call only resets the TTL.
    pub async fn blacklist(&self, token: &str) -> AuthResult<()> {
        within(
            self.deadline,
            self.cache.set(&blacklist_key(token), "true", BLACKLIST_TTL),
        )
        .await
        .inspect_err(|e| error!(error = %e, "failed to blacklist refresh token"))
    }

    /// Whether the token has been blacklisted.
    ///
    /// Cache failures are resolved by the configured [`BlacklistPolicy`].
    pub async fn is_blacklisted(&self, token: &str) -> AuthResult<bool> {
        match within(self.deadline, self.cache.exists(&blacklist_key(token))).await {
            Ok(found) => Ok(found),
            Err(e) => match self.policy {
                BlacklistPolicy::FailOpen => {
                    warn!(error = %e, "blacklist check failed, treating token as not revoked");
                    Ok(false)
                }
                BlacklistPolicy::FailClosed => {
                    warn!(error = %e, "blacklist check failed, rejecting token");
                    Err(AuthError::TokenInvalid("revocation status unavailable".into()))
                }
            },
        }
    }

    /// Record `token` as the user's current refresh token, superseding any
    /// previous one.
    pub async fn set_current_refresh_token(&self, user_id: Uuid, token: &str) -> AuthResult<()> {
        within(
            self.deadline,
            self.cache
                .set(&current_refresh_key(user_id), token, CURRENT_REFRESH_TTL),
        )
        .await
    }

    /// The user's current refresh token; `None` when nothing is recorded.
    pub async fn current_refresh_token(&self, user_id: Uuid) -> AuthResult<Option<String>> {
        within(self.deadline, self.cache.get(&current_refresh_key(user_id))).await
    }

    pub async fn delete_current_refresh_token(&self, user_id: Uuid) -> AuthResult<()> {
        within(self.deadline, self.cache.delete(&current_refresh_key(user_id))).await
    }

    /// Cache a principal snapshot. The password hash is never serialized.
    pub async fn cache_principal(&self, principal: &Principal) -> AuthResult<()> {
        let json = serde_json::to_string(principal)
            .map_err(|e| AuthError::Internal(format!("serialize principal: {e}")))?;
        within(
            self.deadline,
            self.cache
                .set(&principal_key(principal.id), &json, PRINCIPAL_SNAPSHOT_TTL),
        )
        .await
    }

    /// Cached principal snapshot, if present and readable.
    pub async fn cached_principal(&self, user_id: Uuid) -> AuthResult<Option<Principal>> {
        let raw = within(self.deadline, self.cache.get(&principal_key(user_id))).await?;
        Ok(raw.and_then(|json| match serde_json::from_str(&json) {
            Ok(p) => Some(p),
            Err(e) => {
                warn!(%user_id, error = %e, "discarding unreadable principal snapshot");
                None
            }
        }))
    }

    pub async fn forget_principal(&self, user_id: Uuid) -> AuthResult<()> {
        within(self.deadline, self.cache.delete(&principal_key(user_id))).await
    }

    pub async fn cache_role_name(&self, role_id: Uuid, role_type: &str) -> AuthResult<()> {
        within(
            self.deadline,
            self.cache
                .set(&role_name_key(role_id), role_type, ROLE_NAME_TTL),
        )
        .await
    }

    pub async fn cached_role_name(&self, role_id: Uuid) -> AuthResult<Option<String>> {
        within(self.deadline, self.cache.get(&role_name_key(role_id))).await
    }
}
