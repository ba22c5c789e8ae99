//! In-memory store for tests and local development.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use super::{PrincipalStore, RoleStore, StoreError, StoreResult, TokenStore};
use crate::models::auth::{NewPrincipal, Principal, Role, RolePermissions, TokenRecord};

/// In-memory implementation of every store trait.
///
/// Uniqueness of usernames, emails and role types is enforced the same way
/// the database constraints enforce it: the write fails with `Conflict`.
#[derive(Default, Clone)]
pub struct MemoryStore {
    principals: Arc<DashMap<Uuid, Principal>>,
    by_username: Arc<DashMap<String, Uuid>>,
    by_email: Arc<DashMap<String, Uuid>>,
    roles: Arc<DashMap<Uuid, Role>>,
    permissions: Arc<DashMap<Uuid, RolePermissions>>,
    tokens: Arc<DashMap<Uuid, TokenRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a principal's lock/disable flags.
    pub fn set_account_flags(&self, id: Uuid, locked: bool, disabled: bool) {
        if let Some(mut p) = self.principals.get_mut(&id) {
            p.locked = locked;
            p.disabled = disabled;
            p.updated_at = Utc::now();
        }
    }

    fn remove_where(&self, stale: impl Fn(&TokenRecord) -> bool) -> u64 {
        let mut removed = 0;
        self.tokens.retain(|_, r| {
            let drop = stale(r);
            if drop {
                removed += 1;
            }
            !drop
        });
        removed
    }

    /// Snapshot of every token record, for assertions.
    pub fn token_records(&self) -> Vec<TokenRecord> {
        self.tokens.iter().map(|r| r.value().clone()).collect()
    }
}

#[async_trait]
impl PrincipalStore for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Principal>> {
        Ok(self.principals.get(&id).map(|r| r.value().clone()))
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<Principal>> {
        Ok(self
            .by_username
            .get(username)
            .and_then(|id| self.principals.get(id.value()).map(|r| r.value().clone())))
    }

    async fn create(&self, principal: NewPrincipal) -> StoreResult<Principal> {
        if !self.roles.contains_key(&principal.role_id) {
            return Err(StoreError::NotFound(format!("role {}", principal.role_id)));
        }

        let id = Uuid::new_v4();
        // Claim both unique keys before inserting, releasing on collision.
        match self.by_username.entry(principal.username.clone()) {
            Entry::Occupied(_) => {
                return Err(StoreError::Conflict("users_username_key".into()));
            }
            Entry::Vacant(v) => {
                v.insert(id);
            }
        }
        match self.by_email.entry(principal.email.clone()) {
            Entry::Occupied(_) => {
                self.by_username.remove(&principal.username);
                return Err(StoreError::Conflict("users_email_key".into()));
            }
            Entry::Vacant(v) => {
                v.insert(id);
            }
        }

        let now = Utc::now();
        let row = Principal {
            id,
            username: principal.username,
            email: principal.email,
            display_name: principal.display_name,
            password_hash: principal.password_hash,
            locked: false,
            disabled: false,
            role_id: principal.role_id,
            created_at: now,
            updated_at: now,
        };
        self.principals.insert(id, row.clone());
        Ok(row)
    }

    async fn update_role(&self, id: Uuid, role_id: Uuid) -> StoreResult<()> {
        let mut p = self
            .principals
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))?;
        p.role_id = role_id;
        p.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl RoleStore for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Role>> {
        Ok(self.roles.get(&id).map(|r| r.value().clone()))
    }

    async fn find_by_type(&self, role_type: &str) -> StoreResult<Option<Role>> {
        Ok(self
            .roles
            .iter()
            .find(|r| r.role_type == role_type)
            .map(|r| r.value().clone()))
    }

    async fn list(&self) -> StoreResult<Vec<Role>> {
        let mut roles: Vec<Role> = self.roles.iter().map(|r| r.value().clone()).collect();
        roles.sort_by_key(|r| r.permission);
        Ok(roles)
    }

    async fn create(&self, role: Role) -> StoreResult<Role> {
        if self.roles.iter().any(|r| r.role_type == role.role_type) {
            return Err(StoreError::Conflict("roles_role_type_key".into()));
        }
        self.roles.insert(role.id, role.clone());
        Ok(role)
    }

    async fn find_permissions(&self, role_id: Uuid) -> StoreResult<Option<RolePermissions>> {
        Ok(self.permissions.get(&role_id).map(|r| *r.value()))
    }

    async fn save_permissions(&self, permissions: RolePermissions) -> StoreResult<()> {
        if !self.roles.contains_key(&permissions.role_id) {
            return Err(StoreError::NotFound(format!("role {}", permissions.role_id)));
        }
        self.permissions.insert(permissions.role_id, permissions);
        Ok(())
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn save(&self, record: TokenRecord) -> StoreResult<()> {
        self.tokens.insert(record.id, record);
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<TokenRecord>> {
        Ok(self.tokens.get(&id).map(|r| r.value().clone()))
    }

    async fn find_by_user(&self, user_id: Uuid) -> StoreResult<Option<TokenRecord>> {
        Ok(self
            .tokens
            .iter()
            .filter(|r| r.user_id == user_id)
            .max_by_key(|r| r.issued_at)
            .map(|r| r.value().clone()))
    }

    async fn block(&self, id: Uuid) -> StoreResult<()> {
        if let Some(mut record) = self.tokens.get_mut(&id) {
            record.blocked = true;
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn block_for_user(&self, user_id: Uuid) -> StoreResult<u64> {
        let now = Utc::now();
        let mut changed = 0;
        for mut record in self.tokens.iter_mut() {
            if record.user_id == user_id && !record.blocked {
                record.blocked = true;
                record.updated_at = now;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn delete_for_user(&self, user_id: Uuid) -> StoreResult<u64> {
        Ok(self.remove_where(|r| r.user_id == user_id))
    }

    async fn purge_stale(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        Ok(self.remove_where(|r| r.blocked || r.expires_at <= now))
    }
}
