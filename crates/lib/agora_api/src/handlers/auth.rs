//! Authentication request handlers.

use agora_core::auth::IssuedSession;
use agora_core::auth::jwt::ACCESS_TOKEN_TTL_SECS;
use axum::extract::State;
use axum::{Extension, Json};

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::{AuthenticatedUser, RefreshSession};
use crate::models::{
    AccessTokenResponse, LoginRequest, LogoutResponse, RegisterRequest, SessionResponse,
    TokenResponse,
};

fn token_response(session: IssuedSession) -> TokenResponse {
    TokenResponse {
        user_id: session.principal_id,
        role_id: session.role_id,
        access_token: session.access_token,
        refresh_token: session.refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: ACCESS_TOKEN_TTL_SECS,
    }
}

/// `POST /auth/register`: create an account with the default role.
pub async fn register_handler(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> AppResult<Json<TokenResponse>> {
    let session = state
        .auth
        .register(
            &body.username,
            &body.email,
            &body.password,
            body.display_name.as_deref(),
        )
        .await?;
    Ok(Json(token_response(session)))
}

/// `POST /auth/login`: authenticate with username + password.
pub async fn login_handler(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<TokenResponse>> {
    let session = state.auth.login(&body.username, &body.password).await?;
    Ok(Json(token_response(session)))
}

/// `POST /auth/refresh-token`: exchange the verified refresh token for a
/// new access token.
pub async fn refresh_handler(
    State(state): State<AppState>,
    Extension(session): Extension<RefreshSession>,
) -> AppResult<Json<AccessTokenResponse>> {
    let access_token = state.auth.refresh(&session.token).await?;
    Ok(Json(AccessTokenResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: ACCESS_TOKEN_TTL_SECS,
    }))
}

/// `POST /auth/logout`: revoke the presented refresh token.
pub async fn logout_handler(
    State(state): State<AppState>,
    Extension(session): Extension<RefreshSession>,
) -> AppResult<Json<LogoutResponse>> {
    state.auth.logout(&session.token).await?;
    Ok(Json(LogoutResponse { success: true }))
}

/// `GET /auth/session`: echo the caller's access token identity.
pub async fn session_handler(
    Extension(AuthenticatedUser(claims)): Extension<AuthenticatedUser>,
) -> Json<SessionResponse> {
    Json(SessionResponse {
        user_id: claims.sub,
        role_id: claims.rid,
        expires_at: claims.exp,
    })
}
