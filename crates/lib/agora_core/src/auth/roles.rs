//! Default role seeding and administrator bootstrap.

use tracing::{debug, info};
use uuid::Uuid;

use super::password::hash_password;
use super::service::{AuthService, validate_registration};
use super::{AuthError, AuthResult};
use crate::models::auth::{
    NewPrincipal, ROLE_ADMINISTRATOR, ROLE_MODERATOR, ROLE_USER, Role, RolePermissions,
};

/// Identifiers of the three seeded roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultRoles {
    pub user: Uuid,
    pub moderator: Uuid,
    pub administrator: Uuid,
}

struct RoleSeed {
    role_type: &'static str,
    permission: i32,
    admin_role: bool,
    mod_role: bool,
    permissions: fn(Uuid) -> RolePermissions,
}

const SEEDS: [RoleSeed; 3] = [
    RoleSeed {
        role_type: ROLE_USER,
        permission: 1,
        admin_role: false,
        mod_role: false,
        permissions: |id| RolePermissions::uniform(id, false),
    },
    RoleSeed {
        role_type: ROLE_MODERATOR,
        permission: 2,
        admin_role: false,
        mod_role: true,
        permissions: |id| RolePermissions {
            can_manage_posts: true,
            ..RolePermissions::uniform(id, false)
        },
    },
    RoleSeed {
        role_type: ROLE_ADMINISTRATOR,
        permission: 3,
        admin_role: true,
        mod_role: false,
        permissions: |id| RolePermissions::uniform(id, true),
    },
];

/// Create the default roles and their permission records if missing.
///
/// Safe to run on every startup; existing roles and permission records are
/// left untouched.
pub async fn seed_default_roles(service: &AuthService) -> AuthResult<DefaultRoles> {
    let mut ids = [Uuid::nil(); 3];
    for (seed, id) in SEEDS.iter().zip(ids.iter_mut()) {
        *id = ensure_role(service, seed).await?;
    }
    let [user, moderator, administrator] = ids;
    info!(%user, %moderator, %administrator, "default roles ready");
    Ok(DefaultRoles {
        user,
        moderator,
        administrator,
    })
}

async fn ensure_role(service: &AuthService, seed: &RoleSeed) -> AuthResult<Uuid> {
    let roles = service.role_store();

    let role = match service.db(roles.find_by_type(seed.role_type)).await? {
        Some(existing) => existing,
        None => {
            let created = service
                .db(roles.create(Role {
                    id: Uuid::new_v4(),
                    role_type: seed.role_type.to_string(),
                    permission: seed.permission,
                    admin_role: seed.admin_role,
                    mod_role: seed.mod_role,
                }))
                .await;
            match created {
                Ok(role) => {
                    debug!(role_type = seed.role_type, "seeded role");
                    role
                }
                // Another instance seeded it first.
                Err(AuthError::Conflict(_)) => service
                    .db(roles.find_by_type(seed.role_type))
                    .await?
                    .ok_or_else(|| {
                        AuthError::Internal(format!("role '{}' vanished", seed.role_type))
                    })?,
                Err(e) => return Err(e),
            }
        }
    };

    if service.db(roles.find_permissions(role.id)).await?.is_none() {
        service
            .db(roles.save_permissions((seed.permissions)(role.id)))
            .await?;
        debug!(role_type = seed.role_type, "seeded role permissions");
    }
    Ok(role.id)
}

/// Create the configured administrator account.
///
/// Returns the new principal's ID, or `None` when the username or email is
/// already taken.
pub async fn bootstrap_admin(
    service: &AuthService,
    roles: &DefaultRoles,
    username: &str,
    email: &str,
    password: &str,
) -> AuthResult<Option<Uuid>> {
    validate_registration(username, email, password)?;
    let password_hash = hash_password(password)?;
    let created = service
        .db(service.principal_store().create(NewPrincipal {
            username: username.to_string(),
            email: email.to_string(),
            display_name: None,
            password_hash,
            role_id: roles.administrator,
        }))
        .await;

    match created {
        Ok(principal) => {
            info!(user_id = %principal.id, username, "created administrator account");
            Ok(Some(principal.id))
        }
        Err(AuthError::Conflict(_)) => {
            info!(username, "administrator account already exists");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
