//! Session lifecycle: registration, login, refresh, logout and role changes.
//!
//! `AuthService` owns every collaborator the flows need (stores, revocation
//! store, signing keys) and is built once at startup, then shared behind an
//! `Arc`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::jwt::TokenKeys;
use super::password::{hash_password, verify_against_dummy, verify_password};
use super::revocation::RevocationStore;
use super::{AuthError, AuthResult, within};
use crate::models::auth::{
    AccessClaims, NewPrincipal, Principal, ROLE_USER, RefreshClaims, Role, RolePermissions,
    RolePermissionsPatch, TokenRecord,
};
use crate::store::{PrincipalStore, RoleStore, StoreResult, TokenStore};

/// Default deadline for a single database call.
pub const DEFAULT_STORE_DEADLINE: Duration = Duration::from_secs(5);

/// Token pair handed out by register and login.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub principal_id: Uuid,
    pub role_id: Uuid,
    pub access_token: String,
    pub refresh_token: String,
}

/// Authentication and session service.
#[derive(Clone)]
pub struct AuthService {
    principals: Arc<dyn PrincipalStore>,
    roles: Arc<dyn RoleStore>,
    tokens: Arc<dyn TokenStore>,
    revocation: RevocationStore,
    keys: TokenKeys,
    store_deadline: Duration,
}

impl AuthService {
    pub fn new(
        principals: Arc<dyn PrincipalStore>,
        roles: Arc<dyn RoleStore>,
        tokens: Arc<dyn TokenStore>,
        revocation: RevocationStore,
        keys: TokenKeys,
    ) -> Self {
        Self {
            principals,
            roles,
            tokens,
            revocation,
            keys,
            store_deadline: DEFAULT_STORE_DEADLINE,
        }
    }

    /// Build from one value implementing every store trait.
    pub fn from_store<S>(store: S, revocation: RevocationStore, keys: TokenKeys) -> Self
    where
        S: PrincipalStore + RoleStore + TokenStore + 'static,
    {
        let store = Arc::new(store);
        Self::new(store.clone(), store.clone(), store, revocation, keys)
    }

    pub fn with_store_deadline(mut self, deadline: Duration) -> Self {
        self.store_deadline = deadline;
        self
    }

    pub fn keys(&self) -> &TokenKeys {
        &self.keys
    }

    pub fn revocation(&self) -> &RevocationStore {
        &self.revocation
    }

    pub(crate) fn role_store(&self) -> &dyn RoleStore {
        self.roles.as_ref()
    }

    pub(crate) fn principal_store(&self) -> &dyn PrincipalStore {
        self.principals.as_ref()
    }

    /// Run a store call under the store deadline.
    pub(crate) async fn db<T>(&self, fut: impl Future<Output = StoreResult<T>>) -> AuthResult<T> {
        within(self.store_deadline, fut).await
    }

    // -----------------------------------------------------------------------
    // Credential flows
    // -----------------------------------------------------------------------

    /// Create a principal with the default `user` role and open a session.
    ///
    /// Username and email uniqueness is left to the store; a collision comes
    /// back as `Conflict`.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> AuthResult<IssuedSession> {
        validate_registration(username, email, password)?;

        let role = self
            .db(self.roles.find_by_type(ROLE_USER))
            .await?
            .ok_or_else(|| AuthError::Internal(format!("default role '{ROLE_USER}' missing")))?;

        let password_hash = hash_password(password)?;
        let principal = self
            .db(self.principals.create(NewPrincipal {
                username: username.to_string(),
                email: email.to_string(),
                display_name: display_name.map(str::to_string),
                password_hash,
                role_id: role.id,
            }))
            .await?;

        let access_token = self.keys.issue_access_token(principal.id, principal.role_id)?;
        let refresh_token = self.mint_refresh_token(principal.id).await?;

        info!(user_id = %principal.id, username, "registered user");
        Ok(IssuedSession {
            principal_id: principal.id,
            role_id: principal.role_id,
            access_token,
            refresh_token,
        })
    }

    /// Authenticate with username + password.
    ///
    /// An unknown username and a wrong password both yield
    /// `InvalidCredentials` after one bcrypt verification.
    pub async fn login(&self, username: &str, password: &str) -> AuthResult<IssuedSession> {
        let Some(principal) = self.db(self.principals.find_by_username(username)).await? else {
            verify_against_dummy(password);
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_password(password, &principal.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }

        if !principal.is_active() {
            return Err(AuthError::Forbidden("account is locked or disabled".into()));
        }

        let access_token = self.keys.issue_access_token(principal.id, principal.role_id)?;
        let refresh_token = match self.reusable_refresh_token(principal.id).await {
            Some(token) => token,
            None => self.mint_refresh_token(principal.id).await?,
        };

        info!(user_id = %principal.id, "user logged in");
        Ok(IssuedSession {
            principal_id: principal.id,
            role_id: principal.role_id,
            access_token,
            refresh_token,
        })
    }

    /// The user's current refresh token, if it is still good to hand out.
    async fn reusable_refresh_token(&self, user_id: Uuid) -> Option<String> {
        let current = match self.revocation.current_refresh_token(user_id).await {
            Ok(current) => current?,
            Err(e) => {
                warn!(%user_id, error = %e, "current refresh token lookup failed");
                return None;
            }
        };

        let claims = self.keys.validate_refresh(&current).ok()?;
        if claims.sub != user_id.to_string() {
            return None;
        }
        // The cache may outlive the record; the store of record decides.
        let record = match self.db(self.tokens.find_by_user(user_id)).await {
            Ok(record) => record?,
            Err(e) => {
                warn!(%user_id, error = %e, "token record lookup failed");
                return None;
            }
        };
        if record.blocked || record.token_hash != hash_refresh_token(&current) {
            return None;
        }
        match self.revocation.is_blacklisted(&current).await {
            Ok(false) => {
                debug!(%user_id, "reusing current refresh token");
                Some(current)
            }
            _ => None,
        }
    }

    /// Sign a new refresh token, replace the user's records with it and mark
    /// it current. Nothing is written unless signing succeeds.
    async fn mint_refresh_token(&self, user_id: Uuid) -> AuthResult<String> {
        let issued = self.keys.issue_refresh_token(user_id)?;

        let removed = self.db(self.tokens.delete_for_user(user_id)).await?;
        if removed > 0 {
            debug!(%user_id, removed, "dropped superseded token records");
        }
        self.db(self.tokens.save(TokenRecord {
            id: issued.jti,
            user_id,
            token_hash: hash_refresh_token(&issued.token),
            blocked: false,
            issued_at: issued.issued_at,
            updated_at: issued.issued_at,
            expires_at: issued.expires_at,
        }))
        .await?;
        self.revocation
            .set_current_refresh_token(user_id, &issued.token)
            .await?;

        Ok(issued.token)
    }

    // -----------------------------------------------------------------------
    // Token verification
    // -----------------------------------------------------------------------

    /// Blacklist check, signature and expiry validation, then the token's
    /// record: it must exist, be unblocked and match the presented token.
    ///
    /// A validly signed token that has been blacklisted, blocked or
    /// superseded is `TokenRevoked`.
    pub async fn verify_refresh_token(&self, token: &str) -> AuthResult<RefreshClaims> {
        if self.revocation.is_blacklisted(token).await? {
            return Err(AuthError::TokenRevoked);
        }
        let claims = self.keys.validate_refresh(token)?;
        let jti = Uuid::parse_str(&claims.jti)
            .map_err(|_| AuthError::TokenInvalid("token id is not a UUID".into()))?;

        match self.db(self.tokens.find_by_id(jti)).await? {
            Some(record)
                if !record.blocked
                    && record.user_id.to_string() == claims.sub
                    && record.token_hash == hash_refresh_token(token) =>
            {
                Ok(claims)
            }
            Some(_) => Err(AuthError::TokenRevoked),
            None => {
                debug!(%jti, "refresh token has no live record");
                Err(AuthError::TokenRevoked)
            }
        }
    }

    /// Validate a bearer access token.
    pub fn authenticate_access(&self, token: &str) -> AuthResult<AccessClaims> {
        self.keys.validate_access(token)
    }

    /// Exchange a refresh token for a new access token carrying the
    /// principal's current role.
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<String> {
        let claims = self.verify_refresh_token(refresh_token).await?;
        let user_id = parse_subject(&claims.sub)?;

        let principal = self
            .principal_snapshot(user_id)
            .await?
            .ok_or_else(|| AuthError::TokenInvalid("subject no longer exists".into()))?;
        if !principal.is_active() {
            return Err(AuthError::Forbidden("account is locked or disabled".into()));
        }

        debug!(%user_id, "issued access token from refresh token");
        self.keys.issue_access_token(principal.id, principal.role_id)
    }

    /// Revoke a refresh token. Expired but authentic tokens are accepted.
    pub async fn logout(&self, refresh_token: &str) -> AuthResult<()> {
        let claims = self.keys.decode_refresh_unchecked_expiry(refresh_token)?;
        let user_id = parse_subject(&claims.sub)?;

        self.revocation.blacklist(refresh_token).await?;
        if let Ok(jti) = Uuid::parse_str(&claims.jti) {
            self.db(self.tokens.block(jti)).await?;
        }
        self.revocation.delete_current_refresh_token(user_id).await?;

        info!(%user_id, "user logged out");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Principals
    // -----------------------------------------------------------------------

    /// Principal by ID through the `user:<id>` snapshot cache.
    ///
    /// The cache is a convenience; when it fails the store answers alone.
    pub async fn principal_snapshot(&self, user_id: Uuid) -> AuthResult<Option<Principal>> {
        match self.revocation.cached_principal(user_id).await {
            Ok(Some(p)) => return Ok(Some(p)),
            Ok(None) => {}
            Err(e) => warn!(%user_id, error = %e, "principal cache read failed"),
        }

        let Some(principal) = self.db(self.principals.find_by_id(user_id)).await? else {
            return Ok(None);
        };
        if let Err(e) = self.revocation.cache_principal(&principal).await {
            warn!(%user_id, error = %e, "principal cache write failed");
        }
        Ok(Some(principal))
    }

    /// Move a principal to another role and revoke their sessions so the
    /// next refresh picks up the new role.
    ///
    /// Every token record is blocked and the caches are cleared before the
    /// role is written, so a failure leaves the old role with no live session.
    pub async fn change_user_role(&self, user_id: Uuid, role_id: Uuid) -> AuthResult<()> {
        if self.db(self.roles.find_by_id(role_id)).await?.is_none() {
            return Err(AuthError::NotFound(format!("role {role_id}")));
        }
        if self.db(self.principals.find_by_id(user_id)).await?.is_none() {
            return Err(AuthError::NotFound(format!("user {user_id}")));
        }

        let blocked = self.db(self.tokens.block_for_user(user_id)).await?;
        if let Some(current) = self.revocation.current_refresh_token(user_id).await? {
            self.revocation.blacklist(&current).await?;
        }
        self.revocation.delete_current_refresh_token(user_id).await?;
        self.revocation.forget_principal(user_id).await?;

        self.db(self.principals.update_role(user_id, role_id)).await?;
        // A refresh racing the update may have cached the old snapshot again.
        if let Err(e) = self.revocation.forget_principal(user_id).await {
            warn!(%user_id, error = %e, "principal cache eviction failed");
        }

        info!(%user_id, %role_id, blocked, "changed user role");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Roles
    // -----------------------------------------------------------------------

    pub async fn list_roles(&self) -> AuthResult<Vec<Role>> {
        self.db(self.roles.list()).await
    }

    /// Type name of a role through the `role:<id>` cache.
    pub async fn role_type_name(&self, role_id: Uuid) -> AuthResult<Option<String>> {
        match self.revocation.cached_role_name(role_id).await {
            Ok(Some(name)) => return Ok(Some(name)),
            Ok(None) => {}
            Err(e) => warn!(%role_id, error = %e, "role cache read failed"),
        }

        let Some(role) = self.db(self.roles.find_by_id(role_id)).await? else {
            return Ok(None);
        };
        if let Err(e) = self.revocation.cache_role_name(role.id, &role.role_type).await {
            warn!(%role_id, error = %e, "role cache write failed");
        }
        Ok(Some(role.role_type))
    }

    pub async fn role_permissions(&self, role_id: Uuid) -> AuthResult<RolePermissions> {
        self.db(self.roles.find_permissions(role_id))
            .await?
            .ok_or_else(|| AuthError::NotFound(format!("permissions for role {role_id}")))
    }

    /// Apply a partial update to a role's permissions. A role without a
    /// permission record starts from all flags unset.
    pub async fn update_role_permissions(
        &self,
        role_id: Uuid,
        patch: RolePermissionsPatch,
    ) -> AuthResult<RolePermissions> {
        if self.db(self.roles.find_by_id(role_id)).await?.is_none() {
            return Err(AuthError::NotFound(format!("role {role_id}")));
        }
        let mut perms = self
            .db(self.roles.find_permissions(role_id))
            .await?
            .unwrap_or_else(|| RolePermissions::uniform(role_id, false));
        patch.apply(&mut perms);
        self.db(self.roles.save_permissions(perms)).await?;

        info!(%role_id, "updated role permissions");
        Ok(perms)
    }

    /// Delete token records that are blocked or expired.
    pub async fn purge_stale_tokens(&self) -> AuthResult<u64> {
        self.db(self.tokens.purge_stale(chrono::Utc::now())).await
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// SHA-256 hash of a refresh token, hex encoded, for storage.
pub fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub(crate) fn parse_subject(sub: &str) -> AuthResult<Uuid> {
    Uuid::parse_str(sub).map_err(|_| AuthError::TokenInvalid("subject is not a UUID".into()))
}

/// Registration field rules: username 4-15 characters, a plausible email,
/// password 6-35 characters.
pub fn validate_registration(username: &str, email: &str, password: &str) -> AuthResult<()> {
    let username_len = username.chars().count();
    if !(4..=15).contains(&username_len) {
        return Err(AuthError::Validation(
            "Username must be between 4 and 15 characters".into(),
        ));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
        _ => return Err(AuthError::Validation("Email address is invalid".into())),
    }
    let password_len = password.chars().count();
    if !(6..=35).contains(&password_len) {
        return Err(AuthError::Validation(
            "Password must be between 6 and 35 characters".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::auth::roles::seed_default_roles;
    use crate::auth::testing::{Fixture, TEST_SECRET, fixture};
    use crate::cache::{CacheError, CacheResult, KeyValueCache, MemoryCache};
    use crate::models::auth::ROLE_MODERATOR;
    use crate::store::MemoryStore;

    #[test]
    fn registration_rules() {
        assert!(validate_registration("alice", "alice@x.com", "secret1").is_ok());
        assert!(validate_registration("bob", "bob@x.com", "secret1").is_err());
        assert!(validate_registration("a_very_long_username", "a@x.com", "secret1").is_err());
        assert!(validate_registration("alice", "alice.x.com", "secret1").is_err());
        assert!(validate_registration("alice", "@x.com", "secret1").is_err());
        assert!(validate_registration("alice", "alice@", "secret1").is_err());
        assert!(validate_registration("alice", "alice@x.com", "short").is_err());
        assert!(validate_registration("alice", "alice@x.com", &"p".repeat(36)).is_err());
    }

    #[test]
    fn refresh_token_hash_is_hex_sha256() {
        let h = hash_refresh_token("abc");
        assert_eq!(h.len(), 64);
        assert_eq!(
            h,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn register_issues_tokens_and_persists_hashed_record() {
        let Fixture {
            service,
            store,
            roles,
            ..
        } = fixture().await;

        let session = service
            .register("alice", "alice@x.com", "secret1", None)
            .await
            .unwrap();
        assert_eq!(session.role_id, roles.user);

        let access = service.authenticate_access(&session.access_token).unwrap();
        assert_eq!(access.sub, session.principal_id.to_string());
        assert_eq!(access.rid, roles.user.to_string());

        let refresh = service
            .verify_refresh_token(&session.refresh_token)
            .await
            .unwrap();
        let records = store.token_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id.to_string(), refresh.jti);
        assert_eq!(records[0].token_hash, hash_refresh_token(&session.refresh_token));
        assert_ne!(records[0].token_hash, session.refresh_token);

        let current = service
            .revocation()
            .current_refresh_token(session.principal_id)
            .await
            .unwrap();
        assert_eq!(current.as_deref(), Some(session.refresh_token.as_str()));
    }

    #[tokio::test]
    async fn duplicate_registration_is_conflict() {
        let Fixture { service, .. } = fixture().await;
        service
            .register("alice", "alice@x.com", "secret1", None)
            .await
            .unwrap();

        let same_name = service
            .register("alice", "other@x.com", "secret1", None)
            .await;
        assert!(matches!(same_name, Err(AuthError::Conflict(_))));

        let same_email = service
            .register("alice2", "alice@x.com", "secret1", None)
            .await;
        assert!(matches!(same_email, Err(AuthError::Conflict(_))));
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let Fixture { service, .. } = fixture().await;
        service
            .register("alice", "alice@x.com", "secret1", None)
            .await
            .unwrap();

        let wrong_password = service.login("alice", "nope123").await.unwrap_err();
        let unknown_user = service.login("mallory", "secret1").await.unwrap_err();
        assert!(matches!(wrong_password, AuthError::InvalidCredentials));
        assert!(matches!(unknown_user, AuthError::InvalidCredentials));
        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
    }

    #[tokio::test]
    async fn login_reuses_current_refresh_token() {
        let Fixture { service, store, .. } = fixture().await;
        let registered = service
            .register("alice", "alice@x.com", "secret1", None)
            .await
            .unwrap();

        let session = service.login("alice", "secret1").await.unwrap();
        assert_eq!(session.refresh_token, registered.refresh_token);
        assert_eq!(store.token_records().len(), 1);
    }

    #[tokio::test]
    async fn login_after_logout_mints_new_refresh_token() {
        let Fixture { service, store, .. } = fixture().await;
        let registered = service
            .register("alice", "alice@x.com", "secret1", None)
            .await
            .unwrap();
        service.logout(&registered.refresh_token).await.unwrap();

        let session = service.login("alice", "secret1").await.unwrap();
        assert_ne!(session.refresh_token, registered.refresh_token);

        let records = store.token_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].token_hash, hash_refresh_token(&session.refresh_token));
        assert!(!records[0].blocked);
    }

    #[tokio::test]
    async fn locked_account_cannot_log_in_or_refresh() {
        let Fixture { service, store, .. } = fixture().await;
        let session = service
            .register("alice", "alice@x.com", "secret1", None)
            .await
            .unwrap();
        store.set_account_flags(session.principal_id, true, false);

        assert!(matches!(
            service.login("alice", "secret1").await,
            Err(AuthError::Forbidden(_))
        ));
        assert!(matches!(
            service.refresh(&session.refresh_token).await,
            Err(AuthError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn refresh_issues_access_token_for_current_role() {
        let Fixture { service, .. } = fixture().await;
        let session = service
            .register("alice", "alice@x.com", "secret1", None)
            .await
            .unwrap();

        let access = service.refresh(&session.refresh_token).await.unwrap();
        let claims = service.authenticate_access(&access).unwrap();
        assert_eq!(claims.sub, session.principal_id.to_string());
        assert_eq!(claims.rid, session.role_id.to_string());

        // Snapshot now cached without the password hash.
        let cached = service
            .revocation()
            .cached_principal(session.principal_id)
            .await
            .unwrap()
            .unwrap();
        assert!(cached.password_hash.is_empty());
    }

    /// Persist a record for a token minted outside the service.
    async fn record_token(store: &MemoryStore, user_id: Uuid) -> String {
        let issued = TokenKeys::new(TEST_SECRET)
            .issue_refresh_token(user_id)
            .unwrap();
        store
            .save(TokenRecord {
                id: issued.jti,
                user_id,
                token_hash: hash_refresh_token(&issued.token),
                blocked: false,
                issued_at: issued.issued_at,
                updated_at: issued.issued_at,
                expires_at: issued.expires_at,
            })
            .await
            .unwrap();
        issued.token
    }

    #[tokio::test]
    async fn refresh_for_vanished_subject_is_invalid() {
        let Fixture { service, store, .. } = fixture().await;
        let token = record_token(&store, Uuid::new_v4()).await;
        assert!(matches!(
            service.refresh(&token).await,
            Err(AuthError::TokenInvalid(_))
        ));
    }

    #[tokio::test]
    async fn refresh_token_without_record_is_revoked() {
        let Fixture { service, .. } = fixture().await;
        let issued = service.keys().issue_refresh_token(Uuid::new_v4()).unwrap();
        assert!(matches!(
            service.verify_refresh_token(&issued.token).await,
            Err(AuthError::TokenRevoked)
        ));
    }

    #[tokio::test]
    async fn blocked_record_revokes_token_without_blacklist_entry() {
        let Fixture { service, store, .. } = fixture().await;
        let session = service
            .register("alice", "alice@x.com", "secret1", None)
            .await
            .unwrap();
        store.block_for_user(session.principal_id).await.unwrap();

        assert!(
            !service
                .revocation()
                .is_blacklisted(&session.refresh_token)
                .await
                .unwrap()
        );
        assert!(matches!(
            service.refresh(&session.refresh_token).await,
            Err(AuthError::TokenRevoked)
        ));
    }

    #[tokio::test]
    async fn login_without_current_key_supersedes_old_token() {
        let Fixture { service, store, .. } = fixture().await;
        let registered = service
            .register("alice", "alice@x.com", "secret1", None)
            .await
            .unwrap();
        // The current-token key expires well before the token itself.
        service
            .revocation()
            .delete_current_refresh_token(registered.principal_id)
            .await
            .unwrap();

        let session = service.login("alice", "secret1").await.unwrap();
        assert_ne!(session.refresh_token, registered.refresh_token);
        assert_eq!(store.token_records().len(), 1);

        assert!(matches!(
            service.refresh(&registered.refresh_token).await,
            Err(AuthError::TokenRevoked)
        ));
        assert!(service.refresh(&session.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn blacklisted_refresh_token_is_revoked() {
        let Fixture { service, .. } = fixture().await;
        let session = service
            .register("alice", "alice@x.com", "secret1", None)
            .await
            .unwrap();
        assert!(service.verify_refresh_token(&session.refresh_token).await.is_ok());

        service
            .revocation()
            .blacklist(&session.refresh_token)
            .await
            .unwrap();

        // Still cryptographically valid, but the pipeline rejects it.
        assert!(service.keys().validate_refresh(&session.refresh_token).is_ok());
        assert!(matches!(
            service.verify_refresh_token(&session.refresh_token).await,
            Err(AuthError::TokenRevoked)
        ));
        assert!(matches!(
            service.refresh(&session.refresh_token).await,
            Err(AuthError::TokenRevoked)
        ));
    }

    #[tokio::test]
    async fn logout_blocks_record_and_clears_current_token() {
        let Fixture { service, store, .. } = fixture().await;
        let session = service
            .register("alice", "alice@x.com", "secret1", None)
            .await
            .unwrap();

        service.logout(&session.refresh_token).await.unwrap();

        assert!(
            service
                .revocation()
                .is_blacklisted(&session.refresh_token)
                .await
                .unwrap()
        );
        assert!(store.token_records().iter().all(|r| r.blocked));
        assert_eq!(
            service
                .revocation()
                .current_refresh_token(session.principal_id)
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn logout_rejects_forged_token() {
        let Fixture { service, .. } = fixture().await;
        let other = TokenKeys::new(b"some-other-secret");
        let forged = other.issue_refresh_token(Uuid::new_v4()).unwrap();
        assert!(matches!(
            service.logout(&forged.token).await,
            Err(AuthError::TokenInvalid(_))
        ));
    }

    #[tokio::test]
    async fn change_user_role_revokes_current_session() {
        let Fixture { service, roles, .. } = fixture().await;
        let session = service
            .register("alice", "alice@x.com", "secret1", None)
            .await
            .unwrap();
        // Warm the snapshot so the change has something to invalidate.
        service.refresh(&session.refresh_token).await.unwrap();

        service
            .change_user_role(session.principal_id, roles.moderator)
            .await
            .unwrap();

        assert!(matches!(
            service.verify_refresh_token(&session.refresh_token).await,
            Err(AuthError::TokenRevoked)
        ));

        let relogin = service.login("alice", "secret1").await.unwrap();
        assert_eq!(relogin.role_id, roles.moderator);
        let access = service.refresh(&relogin.refresh_token).await.unwrap();
        let claims = service.authenticate_access(&access).unwrap();
        assert_eq!(claims.rid, roles.moderator.to_string());
        assert_eq!(
            service.role_type_name(roles.moderator).await.unwrap().as_deref(),
            Some(ROLE_MODERATOR)
        );
    }

    #[tokio::test]
    async fn change_user_role_revokes_tokens_without_current_key() {
        let Fixture {
            service,
            store,
            roles,
            ..
        } = fixture().await;
        let session = service
            .register("alice", "alice@x.com", "secret1", None)
            .await
            .unwrap();
        service
            .revocation()
            .delete_current_refresh_token(session.principal_id)
            .await
            .unwrap();

        service
            .change_user_role(session.principal_id, roles.moderator)
            .await
            .unwrap();

        assert!(store.token_records().iter().all(|r| r.blocked));
        assert!(matches!(
            service.verify_refresh_token(&session.refresh_token).await,
            Err(AuthError::TokenRevoked)
        ));
    }

    /// Memory cache whose writes can be switched off.
    #[derive(Clone)]
    struct FlakyCache {
        inner: MemoryCache,
        fail_writes: Arc<AtomicBool>,
    }

    #[async_trait]
    impl KeyValueCache for FlakyCache {
        async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(CacheError::Unavailable("write refused".into()));
            }
            self.inner.set(key, value, ttl).await
        }
        async fn get(&self, key: &str) -> CacheResult<Option<String>> {
            self.inner.get(key).await
        }
        async fn exists(&self, key: &str) -> CacheResult<bool> {
            self.inner.exists(key).await
        }
        async fn delete(&self, key: &str) -> CacheResult<()> {
            self.inner.delete(key).await
        }
    }

    #[tokio::test]
    async fn failed_role_change_keeps_role_and_leaves_no_live_session() {
        let store = MemoryStore::new();
        let cache = FlakyCache {
            inner: MemoryCache::new(),
            fail_writes: Arc::new(AtomicBool::new(false)),
        };
        let service = AuthService::from_store(
            store.clone(),
            RevocationStore::new(Arc::new(cache.clone())),
            TokenKeys::new(TEST_SECRET),
        );
        let roles = seed_default_roles(&service).await.unwrap();
        let session = service
            .register("alice", "alice@x.com", "secret1", None)
            .await
            .unwrap();
        service.refresh(&session.refresh_token).await.unwrap();

        cache.fail_writes.store(true, Ordering::SeqCst);
        assert!(matches!(
            service
                .change_user_role(session.principal_id, roles.moderator)
                .await,
            Err(AuthError::StorageUnavailable(_))
        ));

        let principal = PrincipalStore::find_by_id(&store, session.principal_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(principal.role_id, roles.user);
        assert!(matches!(
            service.refresh(&session.refresh_token).await,
            Err(AuthError::TokenRevoked)
        ));
    }

    #[tokio::test]
    async fn change_user_role_to_unknown_role_is_not_found() {
        let Fixture { service, .. } = fixture().await;
        let session = service
            .register("alice", "alice@x.com", "secret1", None)
            .await
            .unwrap();
        assert!(matches!(
            service
                .change_user_role(session.principal_id, Uuid::new_v4())
                .await,
            Err(AuthError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn change_role_of_unknown_user_is_not_found() {
        let Fixture { service, roles, .. } = fixture().await;
        assert!(matches!(
            service.change_user_role(Uuid::new_v4(), roles.user).await,
            Err(AuthError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn update_role_permissions_is_partial() {
        let Fixture { service, roles, .. } = fixture().await;
        let before = service.role_permissions(roles.moderator).await.unwrap();
        assert!(before.can_manage_posts);
        assert!(!before.can_manage_forums);

        let after = service
            .update_role_permissions(
                roles.moderator,
                RolePermissionsPatch {
                    can_manage_forums: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(after.can_manage_posts);
        assert!(after.can_manage_forums);
        assert_eq!(service.role_permissions(roles.moderator).await.unwrap(), after);
    }
}
