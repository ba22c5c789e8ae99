//! PostgreSQL store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{PrincipalStore, RoleStore, StoreError, StoreResult, TokenStore};
use crate::models::auth::{NewPrincipal, Principal, Role, RolePermissions, TokenRecord};

const PRINCIPAL_COLUMNS: &str = "id, username, email, display_name, password_hash, \
     locked, disabled, role_id, created_at, updated_at";

type PrincipalRow = (
    Uuid,
    String,
    String,
    Option<String>,
    String,
    bool,
    bool,
    Uuid,
    DateTime<Utc>,
    DateTime<Utc>,
);

fn principal_from_row(
    (
        id,
        username,
        email,
        display_name,
        password_hash,
        locked,
        disabled,
        role_id,
        created_at,
        updated_at,
    ): PrincipalRow,
) -> Principal {
    Principal {
        id,
        username,
        email,
        display_name,
        password_hash,
        locked,
        disabled,
        role_id,
        created_at,
        updated_at,
    }
}

type RoleRow = (Uuid, String, i32, bool, bool);

fn role_from_row((id, role_type, permission, admin_role, mod_role): RoleRow) -> Role {
    Role {
        id,
        role_type,
        permission,
        admin_role,
        mod_role,
    }
}

type TokenRow = (Uuid, Uuid, String, bool, DateTime<Utc>, DateTime<Utc>, DateTime<Utc>);

fn token_from_row(
    (id, user_id, token_hash, blocked, issued_at, updated_at, expires_at): TokenRow,
) -> TokenRecord {
    TokenRecord {
        id,
        user_id,
        token_hash,
        blocked,
        issued_at,
        updated_at,
        expires_at,
    }
}

/// PostgreSQL implementation of every store trait.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run the embedded migrations from `agora_core/migrations/`.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

#[async_trait]
impl PrincipalStore for PgStore {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Principal>> {
        let sql = format!("SELECT {PRINCIPAL_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query_as::<_, PrincipalRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(principal_from_row))
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<Principal>> {
        let sql = format!("SELECT {PRINCIPAL_COLUMNS} FROM users WHERE username = $1");
        let row = sqlx::query_as::<_, PrincipalRow>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(principal_from_row))
    }

    async fn create(&self, principal: NewPrincipal) -> StoreResult<Principal> {
        let sql = format!(
            "INSERT INTO users (username, email, display_name, password_hash, role_id) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {PRINCIPAL_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PrincipalRow>(&sql)
            .bind(&principal.username)
            .bind(&principal.email)
            .bind(&principal.display_name)
            .bind(&principal.password_hash)
            .bind(principal.role_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(principal_from_row(row))
    }

    async fn update_role(&self, id: Uuid, role_id: Uuid) -> StoreResult<()> {
        let result =
            sqlx::query("UPDATE users SET role_id = $2, updated_at = now() WHERE id = $1")
                .bind(id)
                .bind(role_id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("user {id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl RoleStore for PgStore {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Role>> {
        let row = sqlx::query_as::<_, RoleRow>(
            "SELECT id, role_type, permission, admin_role, mod_role FROM roles WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(role_from_row))
    }

    async fn find_by_type(&self, role_type: &str) -> StoreResult<Option<Role>> {
        let row = sqlx::query_as::<_, RoleRow>(
            "SELECT id, role_type, permission, admin_role, mod_role FROM roles WHERE role_type = $1",
        )
        .bind(role_type)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(role_from_row))
    }

    async fn list(&self) -> StoreResult<Vec<Role>> {
        let rows = sqlx::query_as::<_, RoleRow>(
            "SELECT id, role_type, permission, admin_role, mod_role FROM roles ORDER BY permission",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(role_from_row).collect())
    }

    async fn create(&self, role: Role) -> StoreResult<Role> {
        sqlx::query(
            "INSERT INTO roles (id, role_type, permission, admin_role, mod_role) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(role.id)
        .bind(&role.role_type)
        .bind(role.permission)
        .bind(role.admin_role)
        .bind(role.mod_role)
        .execute(&self.pool)
        .await?;
        Ok(role)
    }

    async fn find_permissions(&self, role_id: Uuid) -> StoreResult<Option<RolePermissions>> {
        let row = sqlx::query_as::<_, (Uuid, bool, bool, bool, bool, bool)>(
            "SELECT role_id, can_manage_categories, can_manage_forums, can_manage_roles, \
                    can_manage_users, can_manage_posts \
             FROM role_permissions WHERE role_id = $1",
        )
        .bind(role_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(
            |(role_id, categories, forums, roles, users, posts)| RolePermissions {
                role_id,
                can_manage_categories: categories,
                can_manage_forums: forums,
                can_manage_roles: roles,
                can_manage_users: users,
                can_manage_posts: posts,
            },
        ))
    }

    async fn save_permissions(&self, permissions: RolePermissions) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO role_permissions \
                 (role_id, can_manage_categories, can_manage_forums, can_manage_roles, \
                  can_manage_users, can_manage_posts) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (role_id) DO UPDATE SET \
                 can_manage_categories = EXCLUDED.can_manage_categories, \
                 can_manage_forums = EXCLUDED.can_manage_forums, \
                 can_manage_roles = EXCLUDED.can_manage_roles, \
                 can_manage_users = EXCLUDED.can_manage_users, \
                 can_manage_posts = EXCLUDED.can_manage_posts",
        )
        .bind(permissions.role_id)
        .bind(permissions.can_manage_categories)
        .bind(permissions.can_manage_forums)
        .bind(permissions.can_manage_roles)
        .bind(permissions.can_manage_users)
        .bind(permissions.can_manage_posts)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn save(&self, record: TokenRecord) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO tokens (id, user_id, token_hash, blocked, issued_at, updated_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(&record.token_hash)
        .bind(record.blocked)
        .bind(record.issued_at)
        .bind(record.updated_at)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<TokenRecord>> {
        let row = sqlx::query_as::<_, TokenRow>(
            "SELECT id, user_id, token_hash, blocked, issued_at, updated_at, expires_at \
             FROM tokens WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(token_from_row))
    }

    async fn find_by_user(&self, user_id: Uuid) -> StoreResult<Option<TokenRecord>> {
        let row = sqlx::query_as::<_, TokenRow>(
            "SELECT id, user_id, token_hash, blocked, issued_at, updated_at, expires_at \
             FROM tokens WHERE user_id = $1 ORDER BY issued_at DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(token_from_row))
    }

    async fn block(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE tokens SET blocked = TRUE, updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn block_for_user(&self, user_id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE tokens SET blocked = TRUE, updated_at = now() \
             WHERE user_id = $1 AND NOT blocked",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_for_user(&self, user_id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn purge_stale(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM tokens WHERE blocked OR expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
