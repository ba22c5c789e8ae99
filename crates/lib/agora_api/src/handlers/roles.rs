//! Role permission handlers.

use axum::Json;
use axum::extract::{Path, State};
use uuid::Uuid;

use crate::AppState;
use crate::error::AppResult;
use crate::models::{RolePermissionsResponse, UpdateRolePermissionsRequest};

/// `GET /roles/{id}/permissions`
pub async fn get_role_permissions_handler(
    State(state): State<AppState>,
    Path(role_id): Path<Uuid>,
) -> AppResult<Json<RolePermissionsResponse>> {
    let perms = state.auth.role_permissions(role_id).await?;
    Ok(Json(perms.into()))
}

/// `PUT /roles/{id}/permissions`: partial update; absent flags are kept.
pub async fn update_role_permissions_handler(
    State(state): State<AppState>,
    Path(role_id): Path<Uuid>,
    Json(body): Json<UpdateRolePermissionsRequest>,
) -> AppResult<Json<RolePermissionsResponse>> {
    let perms = state
        .auth
        .update_role_permissions(role_id, body.into())
        .await?;
    Ok(Json(perms.into()))
}
