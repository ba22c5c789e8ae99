//! Administrator-only management handlers.

use axum::Json;
use axum::extract::State;

use crate::AppState;
use crate::error::AppResult;
use crate::models::{ChangeUserRoleRequest, ChangeUserRoleResponse, RoleResponse};

/// `POST /management/change-user-role`: move a user to another role and
/// revoke their current refresh token.
pub async fn change_user_role_handler(
    State(state): State<AppState>,
    Json(body): Json<ChangeUserRoleRequest>,
) -> AppResult<Json<ChangeUserRoleResponse>> {
    state
        .auth
        .change_user_role(body.user_id, body.role_id)
        .await?;
    Ok(Json(ChangeUserRoleResponse {
        user_id: body.user_id,
        role_id: body.role_id,
    }))
}

/// `GET /management/roles`: list every role.
pub async fn list_roles_handler(State(state): State<AppState>) -> AppResult<Json<Vec<RoleResponse>>> {
    let roles = state.auth.list_roles().await?;
    Ok(Json(roles.into_iter().map(RoleResponse::from).collect()))
}
