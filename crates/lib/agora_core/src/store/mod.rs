//! Persistence boundary for principals, roles and refresh token records.
//!
//! [`PgStore`] implements every trait against PostgreSQL; [`MemoryStore`]
//! is an in-process implementation for tests and local development.

pub mod memory;
pub mod pg;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::auth::{NewPrincipal, Principal, Role, RolePermissions, TokenRecord};

pub use self::memory::MemoryStore;
pub use self::pg::PgStore;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound("row not found".into()),
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StoreError::Conflict(db.constraint().unwrap_or("unique").to_string())
            }
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Principal store of record.
#[async_trait]
pub trait PrincipalStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Principal>>;

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<Principal>>;

    /// Insert a principal. Username or email collisions are `Conflict`.
    async fn create(&self, principal: NewPrincipal) -> StoreResult<Principal>;

    /// Point the principal at another role. `NotFound` if the principal is missing.
    async fn update_role(&self, id: Uuid, role_id: Uuid) -> StoreResult<()>;
}

/// Roles and their permission flags.
#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Role>>;

    async fn find_by_type(&self, role_type: &str) -> StoreResult<Option<Role>>;

    async fn list(&self) -> StoreResult<Vec<Role>>;

    /// Insert a role. A duplicate `role_type` is `Conflict`.
    async fn create(&self, role: Role) -> StoreResult<Role>;

    async fn find_permissions(&self, role_id: Uuid) -> StoreResult<Option<RolePermissions>>;

    /// Insert or replace the permission record for `permissions.role_id`.
    async fn save_permissions(&self, permissions: RolePermissions) -> StoreResult<()>;
}

/// Refresh token records.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn save(&self, record: TokenRecord) -> StoreResult<()>;

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<TokenRecord>>;

    /// Most recently issued record for the user, if any.
    async fn find_by_user(&self, user_id: Uuid) -> StoreResult<Option<TokenRecord>>;

    /// Mark a record blocked. Missing records are ignored.
    async fn block(&self, id: Uuid) -> StoreResult<()>;

    /// Mark every record of the user blocked; returns how many changed.
    async fn block_for_user(&self, user_id: Uuid) -> StoreResult<u64>;

    async fn delete_for_user(&self, user_id: Uuid) -> StoreResult<u64>;

    /// Delete records that are blocked or expired at `now`.
    async fn purge_stale(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}
