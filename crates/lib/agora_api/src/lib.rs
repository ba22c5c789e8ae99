//! # agora_api
//!
//! HTTP API library for Agora.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;

use std::sync::Arc;

use agora_core::auth::{AuthService, DefaultRoles};
use agora_core::models::auth::{Permission, ROLE_ADMINISTRATOR};
use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};

use crate::handlers::{auth, management, roles, users};
use crate::middleware::gate::{self, Gate};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    /// Seeded role IDs, used by exact role-ID gates.
    pub default_roles: DefaultRoles,
}

impl AppState {
    pub fn new(auth: Arc<AuthService>, default_roles: DefaultRoles) -> Self {
        Self {
            auth,
            default_roles,
        }
    }
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route(routes::POST_AUTH_REGISTER, post(auth::register_handler))
        .route(routes::POST_AUTH_LOGIN, post(auth::login_handler));

    // Refresh token only
    let refresh = Router::new()
        .route(routes::POST_AUTH_REFRESH_TOKEN, post(auth::refresh_handler))
        .route(routes::POST_AUTH_LOGOUT, post(auth::logout_handler))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth::require_refresh,
        ));

    // Access + refresh token, then a per-route gate
    let admin_only = Router::new()
        .route(
            routes::POST_MANAGEMENT_CHANGE_USER_ROLE,
            post(management::change_user_role_handler),
        )
        .route_layer(from_fn_with_state(
            (state.clone(), Gate::RoleId(state.default_roles.administrator)),
            gate::enforce,
        ));
    let admin_named = Router::new()
        .route(
            routes::GET_MANAGEMENT_ROLES,
            get(management::list_roles_handler),
        )
        .route_layer(from_fn_with_state(
            (state.clone(), Gate::RoleName(ROLE_ADMINISTRATOR)),
            gate::enforce,
        ));
    let role_managers = Router::new()
        .route(
            routes::ROLES_ID_PERMISSIONS,
            get(roles::get_role_permissions_handler).put(roles::update_role_permissions_handler),
        )
        .route_layer(from_fn_with_state(
            (state.clone(), Gate::Permission(Permission::ManageRoles)),
            gate::enforce,
        ));
    let self_only = Router::new()
        .route(routes::GET_USERS_ID, get(users::get_user_handler))
        .route_layer(from_fn_with_state(
            (state.clone(), Gate::SelfOnly),
            gate::enforce,
        ));

    let protected = Router::new()
        .route(routes::GET_AUTH_SESSION, get(auth::session_handler))
        .merge(admin_only)
        .merge(admin_named)
        .merge(role_managers)
        .merge(self_only)
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth::require_session,
        ));

    Router::new()
        .merge(public)
        .merge(refresh)
        .merge(protected)
        .layer(cors)
        .with_state(state)
}
