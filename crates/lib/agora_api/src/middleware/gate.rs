//! Authorization gate middleware.
//!
//! Mounted with `route_layer` inside a `require_session` layer, so the
//! `AuthenticatedUser` extension is already present and path parameters are
//! already matched.

use agora_core::auth::gate as checks;
use agora_core::models::auth::Permission;
use axum::RequestExt;
use axum::extract::{Path, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

use super::auth::AuthenticatedUser;
use crate::AppState;
use crate::error::AppError;

/// Which check a route requires.
#[derive(Debug, Clone)]
pub enum Gate {
    /// Role claim must equal this role ID.
    RoleId(Uuid),
    /// Role type name must equal this name.
    RoleName(&'static str),
    /// The `{id}` path parameter must be the caller.
    SelfOnly,
    /// The role must hold this permission flag.
    Permission(Permission),
}

/// Axum middleware enforcing one [`Gate`].
pub async fn enforce(
    State((state, gate)): State<(AppState, Gate)>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let AuthenticatedUser(claims) = request
        .extensions()
        .get::<AuthenticatedUser>()
        .cloned()
        .ok_or_else(|| AppError::Unauthorized("Not authenticated".into()))?;

    match gate {
        Gate::RoleId(required) => checks::require_role_id(&claims, required)?,
        Gate::RoleName(name) => checks::require_role_name(&state.auth, &claims, name).await?,
        Gate::SelfOnly => {
            let Path(target) = request
                .extract_parts::<Path<Uuid>>()
                .await
                .map_err(|_| AppError::Validation("Invalid user ID".into()))?;
            checks::require_self(&claims, target)?;
        }
        Gate::Permission(permission) => {
            checks::require_permission(&state.auth, &claims, permission).await?
        }
    }

    Ok(next.run(request).await)
}
