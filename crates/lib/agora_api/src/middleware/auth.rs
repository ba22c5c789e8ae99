//! Authentication middleware: bearer access tokens and `X-Refresh-Token`.

use agora_core::models::auth::{AccessClaims, RefreshClaims};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::AppState;
use crate::error::AppError;

/// Header carrying the refresh token.
pub const REFRESH_TOKEN_HEADER: &str = "x-refresh-token";

/// Verified access token claims, stored in request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub AccessClaims);

/// Verified refresh token and its claims, stored in request extensions.
#[derive(Debug, Clone)]
pub struct RefreshSession {
    pub token: String,
    pub claims: RefreshClaims,
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing authorization header".into()))?;
    header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization scheme".into()))
}

fn refresh_token(headers: &HeaderMap) -> Result<&str, AppError> {
    headers
        .get(REFRESH_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Missing refresh token header".into()))
}

/// Axum middleware: verifies `X-Refresh-Token` (blacklist first, then
/// signature and expiry) and injects `RefreshSession`.
pub async fn require_refresh(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = refresh_token(request.headers())?.to_string();
    let claims = state.auth.verify_refresh_token(&token).await?;

    request
        .extensions_mut()
        .insert(RefreshSession { token, claims });
    Ok(next.run(request).await)
}

/// Axum middleware for protected routes: the refresh token must pass
/// revocation and validation, then the bearer access token must validate
/// and belong to the same subject. Injects `AuthenticatedUser`.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let access = bearer_token(request.headers())?;
    let refresh = refresh_token(request.headers())?;

    let refresh_claims = state.auth.verify_refresh_token(refresh).await?;
    let claims = state.auth.authenticate_access(access)?;
    if claims.sub != refresh_claims.sub {
        return Err(AppError::TokenInvalid("token subjects differ".into()));
    }

    request.extensions_mut().insert(AuthenticatedUser(claims));
    Ok(next.run(request).await)
}
