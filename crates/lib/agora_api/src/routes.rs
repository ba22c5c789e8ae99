//! Route paths, all under `/api/v1`.

pub const POST_AUTH_REGISTER: &str = "/api/v1/auth/register";
pub const POST_AUTH_LOGIN: &str = "/api/v1/auth/login";
pub const POST_AUTH_REFRESH_TOKEN: &str = "/api/v1/auth/refresh-token";
pub const POST_AUTH_LOGOUT: &str = "/api/v1/auth/logout";
pub const GET_AUTH_SESSION: &str = "/api/v1/auth/session";
pub const POST_MANAGEMENT_CHANGE_USER_ROLE: &str = "/api/v1/management/change-user-role";
pub const GET_MANAGEMENT_ROLES: &str = "/api/v1/management/roles";
pub const ROLES_ID_PERMISSIONS: &str = "/api/v1/roles/{id}/permissions";
pub const GET_USERS_ID: &str = "/api/v1/users/{id}";
