//! Authorization gates over validated access claims.
//!
//! Each check is stateless per request and terminal: it either lets the
//! request through or returns `Forbidden`. A role or permission record that
//! cannot be found denies access.

use tracing::debug;
use uuid::Uuid;

use super::service::{AuthService, parse_subject};
use super::{AuthError, AuthResult};
use crate::models::auth::{AccessClaims, Permission};

fn role_of(claims: &AccessClaims) -> AuthResult<Uuid> {
    Uuid::parse_str(&claims.rid).map_err(|_| AuthError::TokenInvalid("role is not a UUID".into()))
}

/// Pass only when the role claim is exactly `required`.
pub fn require_role_id(claims: &AccessClaims, required: Uuid) -> AuthResult<()> {
    if role_of(claims)? == required {
        Ok(())
    } else {
        debug!(sub = %claims.sub, rid = %claims.rid, "role ID gate rejected");
        Err(AuthError::Forbidden("insufficient role".into()))
    }
}

/// Pass only when the role's type name is `required`.
pub async fn require_role_name(
    service: &AuthService,
    claims: &AccessClaims,
    required: &str,
) -> AuthResult<()> {
    let role_id = role_of(claims)?;
    match service.role_type_name(role_id).await? {
        Some(name) if name == required => Ok(()),
        found => {
            debug!(sub = %claims.sub, ?found, required, "role name gate rejected");
            Err(AuthError::Forbidden("insufficient role".into()))
        }
    }
}

/// Pass only when the token's subject is the target user.
pub fn require_self(claims: &AccessClaims, target: Uuid) -> AuthResult<()> {
    if parse_subject(&claims.sub)? == target {
        Ok(())
    } else {
        debug!(sub = %claims.sub, %target, "self gate rejected");
        Err(AuthError::Forbidden("may only act on own account".into()))
    }
}

/// Pass only when the role's permission record grants `permission`.
pub async fn require_permission(
    service: &AuthService,
    claims: &AccessClaims,
    permission: Permission,
) -> AuthResult<()> {
    let role_id = role_of(claims)?;
    let granted = match service.role_permissions(role_id).await {
        Ok(perms) => perms.allows(permission),
        Err(AuthError::NotFound(_)) => false,
        Err(e) => return Err(e),
    };
    if granted {
        Ok(())
    } else {
        debug!(sub = %claims.sub, %permission, "permission gate rejected");
        Err(AuthError::Forbidden(format!("missing permission {permission}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testing::{Fixture, fixture};
    use crate::cache::KeyValueCache;
    use crate::models::auth::{ROLE_ADMINISTRATOR, ROLE_MODERATOR};

    fn claims_for(sub: Uuid, rid: Uuid) -> AccessClaims {
        AccessClaims {
            sub: sub.to_string(),
            rid: rid.to_string(),
            iss: "agora-api".into(),
            iat: 0,
            exp: i64::MAX,
        }
    }

    #[tokio::test]
    async fn role_id_gate() {
        let Fixture { roles, .. } = fixture().await;
        let admin = claims_for(Uuid::new_v4(), roles.administrator);
        let user = claims_for(Uuid::new_v4(), roles.user);
        assert!(require_role_id(&admin, roles.administrator).is_ok());
        assert!(matches!(
            require_role_id(&user, roles.administrator),
            Err(AuthError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn role_name_gate() {
        let Fixture { service, roles, .. } = fixture().await;
        let moderator = claims_for(Uuid::new_v4(), roles.moderator);

        assert!(matches!(
            require_role_name(&service, &moderator, ROLE_ADMINISTRATOR).await,
            Err(AuthError::Forbidden(_))
        ));
        assert!(
            require_role_name(&service, &moderator, ROLE_MODERATOR)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn role_name_gate_fills_role_cache() {
        let Fixture {
            service,
            roles,
            cache,
            ..
        } = fixture().await;
        let moderator = claims_for(Uuid::new_v4(), roles.moderator);
        require_role_name(&service, &moderator, ROLE_MODERATOR)
            .await
            .unwrap();

        let cached = cache
            .get(&format!("role:{}", roles.moderator))
            .await
            .unwrap();
        assert_eq!(cached.as_deref(), Some(ROLE_MODERATOR));
    }

    #[tokio::test]
    async fn unknown_role_is_denied() {
        let Fixture { service, .. } = fixture().await;
        let stranger = claims_for(Uuid::new_v4(), Uuid::new_v4());
        assert!(matches!(
            require_role_name(&service, &stranger, ROLE_ADMINISTRATOR).await,
            Err(AuthError::Forbidden(_))
        ));
        assert!(matches!(
            require_permission(&service, &stranger, Permission::ManageForums).await,
            Err(AuthError::Forbidden(_))
        ));
    }

    #[test]
    fn self_gate_ignores_role() {
        let u1 = Uuid::new_v4();
        let u2 = Uuid::new_v4();
        // Role is irrelevant to the self-only gate.
        let u2_admin = claims_for(u2, Uuid::new_v4());
        assert!(matches!(
            require_self(&u2_admin, u1),
            Err(AuthError::Forbidden(_))
        ));
        assert!(require_self(&u2_admin, u2).is_ok());
    }

    #[tokio::test]
    async fn permission_gate() {
        let Fixture { service, roles, .. } = fixture().await;
        let moderator = claims_for(Uuid::new_v4(), roles.moderator);
        let admin = claims_for(Uuid::new_v4(), roles.administrator);

        assert!(
            require_permission(&service, &moderator, Permission::ManagePosts)
                .await
                .is_ok()
        );
        assert!(matches!(
            require_permission(&service, &moderator, Permission::ManageRoles).await,
            Err(AuthError::Forbidden(_))
        ));
        assert!(
            require_permission(&service, &admin, Permission::ManageRoles)
                .await
                .is_ok()
        );
    }

    #[test]
    fn malformed_role_claim_is_invalid() {
        let mut claims = claims_for(Uuid::new_v4(), Uuid::new_v4());
        claims.rid = "admin".into();
        assert!(matches!(
            require_role_id(&claims, Uuid::new_v4()),
            Err(AuthError::TokenInvalid(_))
        ));
    }
}
