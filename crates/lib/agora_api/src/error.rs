//! Application error types.

use agora_core::auth::AuthError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Missing or malformed credentials header.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid token: {0}")]
    TokenInvalid(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Token revoked")]
    TokenRevoked,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Internal server error")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "validation_error", m.as_str()),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m.as_str()),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized", m.as_str()),
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "invalid_credentials",
                "Invalid credentials",
            ),
            AppError::TokenInvalid(_) => {
                (StatusCode::UNAUTHORIZED, "token_invalid", "Invalid token")
            }
            AppError::TokenExpired => (StatusCode::UNAUTHORIZED, "token_expired", "Token expired"),
            AppError::TokenRevoked => (StatusCode::UNAUTHORIZED, "token_revoked", "Token revoked"),
            AppError::Forbidden(m) => (StatusCode::FORBIDDEN, "forbidden", m.as_str()),
            AppError::Conflict(_) => (
                StatusCode::CONFLICT,
                "conflict",
                "Username or email already registered",
            ),
            AppError::StorageUnavailable(detail) => {
                error!(detail, "storage unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "storage_unavailable",
                    "Service temporarily unavailable",
                )
            }
            AppError::Internal(detail) => {
                error!(detail, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error",
                )
            }
        };
        let body = Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials => AppError::InvalidCredentials,
            AuthError::TokenExpired => AppError::TokenExpired,
            AuthError::TokenInvalid(msg) => AppError::TokenInvalid(msg),
            AuthError::TokenRevoked => AppError::TokenRevoked,
            AuthError::Forbidden(msg) => AppError::Forbidden(msg),
            AuthError::Conflict(msg) => AppError::Conflict(msg),
            AuthError::Validation(msg) => AppError::Validation(msg),
            AuthError::NotFound(msg) => AppError::NotFound(msg),
            AuthError::StorageUnavailable(msg) => AppError::StorageUnavailable(msg),
            AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(e: AuthError) -> StatusCode {
        AppError::from(e).into_response().status()
    }

    #[test]
    fn auth_errors_map_to_statuses() {
        assert_eq!(status_of(AuthError::InvalidCredentials), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(AuthError::TokenExpired), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(AuthError::TokenRevoked), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_of(AuthError::TokenInvalid("bad".into())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(AuthError::Forbidden("no".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(AuthError::Conflict("users_username_key".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(AuthError::Validation("short".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(AuthError::StorageUnavailable("down".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(AuthError::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
