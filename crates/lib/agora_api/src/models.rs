//! HTTP request and response shapes.
//!
//! Every body is camelCase on the wire.

use agora_core::models::auth::{Principal, Role, RolePermissions, RolePermissionsPatch};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Token pair returned by register and login.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutResponse {
    pub success: bool,
}

/// Identity carried by the presented access token.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub user_id: String,
    pub role_id: String,
    pub expires_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeUserRoleRequest {
    pub user_id: Uuid,
    pub role_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeUserRoleResponse {
    pub user_id: Uuid,
    pub role_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleResponse {
    pub id: Uuid,
    pub role_type: String,
    pub permission: i32,
    pub is_admin: bool,
    pub is_moderator: bool,
}

impl From<Role> for RoleResponse {
    fn from(r: Role) -> Self {
        Self {
            id: r.id,
            role_type: r.role_type,
            permission: r.permission,
            is_admin: r.admin_role,
            is_moderator: r.mod_role,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RolePermissionsResponse {
    pub role_id: Uuid,
    pub can_manage_categories: bool,
    pub can_manage_forums: bool,
    pub can_manage_roles: bool,
    pub can_manage_users: bool,
    pub can_manage_posts: bool,
}

impl From<RolePermissions> for RolePermissionsResponse {
    fn from(p: RolePermissions) -> Self {
        Self {
            role_id: p.role_id,
            can_manage_categories: p.can_manage_categories,
            can_manage_forums: p.can_manage_forums,
            can_manage_roles: p.can_manage_roles,
            can_manage_users: p.can_manage_users,
            can_manage_posts: p.can_manage_posts,
        }
    }
}

/// Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRolePermissionsRequest {
    pub can_manage_categories: Option<bool>,
    pub can_manage_forums: Option<bool>,
    pub can_manage_roles: Option<bool>,
    pub can_manage_users: Option<bool>,
    pub can_manage_posts: Option<bool>,
}

impl From<UpdateRolePermissionsRequest> for RolePermissionsPatch {
    fn from(r: UpdateRolePermissionsRequest) -> Self {
        Self {
            can_manage_categories: r.can_manage_categories,
            can_manage_forums: r.can_manage_forums,
            can_manage_roles: r.can_manage_roles,
            can_manage_users: r.can_manage_users,
            can_manage_posts: r.can_manage_posts,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub role_id: Uuid,
    pub locked: bool,
    pub disabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Principal> for UserResponse {
    fn from(p: Principal) -> Self {
        Self {
            id: p.id,
            username: p.username,
            email: p.email,
            display_name: p.display_name,
            role_id: p.role_id,
            locked: p.locked,
            disabled: p.disabled,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}
