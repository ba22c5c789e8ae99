//! Authentication domain models.
//!
//! These are internal domain models, distinct from the HTTP request/response
//! shapes in `agora_api` (which carry `#[serde(rename_all = "camelCase")]`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role type names seeded at startup.
pub const ROLE_USER: &str = "user";
pub const ROLE_MODERATOR: &str = "moderator";
pub const ROLE_ADMINISTRATOR: &str = "administrator";

/// Authenticated user identity.
///
/// Serializing a principal never includes the password hash, so the
/// serialized form is what gets cached as a user snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub locked: bool,
    pub disabled: bool,
    pub role_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Principal {
    /// Whether the account may hold a session at all.
    pub fn is_active(&self) -> bool {
        !self.locked && !self.disabled
    }
}

/// Insert payload for a principal.
#[derive(Debug, Clone)]
pub struct NewPrincipal {
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub password_hash: String,
    pub role_id: Uuid,
}

/// Named permission tier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Role {
    pub id: Uuid,
    pub role_type: String,
    pub permission: i32,
    pub admin_role: bool,
    pub mod_role: bool,
}

/// Boolean capabilities attached one-to-one to a role.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RolePermissions {
    pub role_id: Uuid,
    pub can_manage_categories: bool,
    pub can_manage_forums: bool,
    pub can_manage_roles: bool,
    pub can_manage_users: bool,
    pub can_manage_posts: bool,
}

impl RolePermissions {
    /// All flags set to `granted`.
    pub fn uniform(role_id: Uuid, granted: bool) -> Self {
        Self {
            role_id,
            can_manage_categories: granted,
            can_manage_forums: granted,
            can_manage_roles: granted,
            can_manage_users: granted,
            can_manage_posts: granted,
        }
    }

    /// Whether the capability is set.
    pub fn allows(&self, permission: Permission) -> bool {
        match permission {
            Permission::ManageCategories => self.can_manage_categories,
            Permission::ManageForums => self.can_manage_forums,
            Permission::ManageRoles => self.can_manage_roles,
            Permission::ManageUsers => self.can_manage_users,
            Permission::ManagePosts => self.can_manage_posts,
        }
    }
}

/// Partial update of a role's permission flags. `None` leaves a flag as is.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RolePermissionsPatch {
    pub can_manage_categories: Option<bool>,
    pub can_manage_forums: Option<bool>,
    pub can_manage_roles: Option<bool>,
    pub can_manage_users: Option<bool>,
    pub can_manage_posts: Option<bool>,
}

impl RolePermissionsPatch {
    pub fn apply(&self, perms: &mut RolePermissions) {
        let fields = [
            (self.can_manage_categories, &mut perms.can_manage_categories),
            (self.can_manage_forums, &mut perms.can_manage_forums),
            (self.can_manage_roles, &mut perms.can_manage_roles),
            (self.can_manage_users, &mut perms.can_manage_users),
            (self.can_manage_posts, &mut perms.can_manage_posts),
        ];
        for (patch, flag) in fields {
            if let Some(v) = patch {
                *flag = v;
            }
        }
    }
}

/// A single permission flag, used to parameterize the permission gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ManageCategories,
    ManageForums,
    ManageRoles,
    ManageUsers,
    ManagePosts,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ManageCategories => "manage-categories",
            Permission::ManageForums => "manage-forums",
            Permission::ManageRoles => "manage-roles",
            Permission::ManageUsers => "manage-users",
            Permission::ManagePosts => "manage-posts",
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Refresh token record stored in the database.
///
/// The raw token is never persisted, only its SHA-256 hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    /// Equal to the `jti` claim of the refresh token.
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub blocked: bool,
    pub issued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// JWT claims embedded in access tokens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessClaims {
    /// Subject: principal ID.
    pub sub: String,
    /// Role ID.
    pub rid: String,
    /// Issuer.
    pub iss: String,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
}

/// JWT claims embedded in refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshClaims {
    /// Subject: principal ID.
    pub sub: String,
    /// Token ID, matches the persisted `TokenRecord`.
    pub jti: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal() -> Principal {
        Principal {
            id: Uuid::new_v4(),
            username: "alice".into(),
            email: "alice@x.com".into(),
            display_name: None,
            password_hash: "$2b$10$abcdefghijklmnopqrstuv".into(),
            locked: false,
            disabled: false,
            role_id: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn serialized_principal_omits_password_hash() {
        let json = serde_json::to_value(principal()).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["username"], "alice");
    }

    #[test]
    fn cached_principal_deserializes_with_empty_hash() {
        let p = principal();
        let json = serde_json::to_string(&p).unwrap();
        let back: Principal = serde_json::from_str(&json).unwrap();
        assert!(back.password_hash.is_empty());
        assert_eq!(back.id, p.id);
    }

    #[test]
    fn locked_or_disabled_principal_is_inactive() {
        let mut p = principal();
        assert!(p.is_active());
        p.locked = true;
        assert!(!p.is_active());
        p.locked = false;
        p.disabled = true;
        assert!(!p.is_active());
    }

    #[test]
    fn permissions_map_to_flags() {
        let mut perms = RolePermissions::uniform(Uuid::new_v4(), false);
        assert!(!perms.allows(Permission::ManageForums));
        perms.can_manage_forums = true;
        assert!(perms.allows(Permission::ManageForums));
        assert!(!perms.allows(Permission::ManageRoles));
    }

    #[test]
    fn patch_only_touches_given_flags() {
        let mut perms = RolePermissions::uniform(Uuid::new_v4(), true);
        RolePermissionsPatch {
            can_manage_users: Some(false),
            ..Default::default()
        }
        .apply(&mut perms);
        assert!(!perms.can_manage_users);
        assert!(perms.can_manage_roles);
        assert!(perms.can_manage_posts);
    }
}
