use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;

use super::{claims::Identity, jwt::{JwtKeys, TokenError}};
use crate::{error::ApiError, users::repo_types::Role};

pub struct AuthUser(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .ok_or(TokenError::Missing)?;

        let claims = keys.verify(token).map_err(|e| {
            warn!(error = %e, "rejected bearer token");
            e
        })?;

        Ok(AuthUser(claims.identity()))
    }
}

/// `Bearer <token>` -> `<token>`. Whatever follows the scheme is handed to
/// verification, so a wrong scheme surfaces as an invalid token.
fn bearer_token(header: &str) -> Option<&str> {
    let mut parts = header.split_whitespace();
    parts.next()?;
    parts.next()
}

pub fn authorize_role(identity: &Identity, allowed: &[Role]) -> Result<(), ApiError> {
    if allowed.contains(&identity.role) {
        return Ok(());
    }
    warn!(user_id = identity.id, role = ?identity.role, ?allowed, "insufficient permissions");
    Err(ApiError::Forbidden("Insufficient permissions".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn caller(role: Role) -> Identity {
        Identity {
            id: 1,
            email: "someone@example.com".into(),
            role,
        }
    }

    #[test]
    fn admin_passes_admin_gate() {
        assert!(authorize_role(&caller(Role::Admin), &[Role::Admin]).is_ok());
    }

    #[test]
    fn user_is_rejected_by_admin_gate() {
        let err = authorize_role(&caller(Role::User), &[Role::Admin]).unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.to_string(), "Insufficient permissions");
    }

    #[test]
    fn multi_role_allow_list() {
        assert!(authorize_role(&caller(Role::User), &[Role::Admin, Role::User]).is_ok());
        assert!(authorize_role(&caller(Role::User), &[]).is_err());
    }

    #[test]
    fn bearer_parsing() {
        assert_eq!(bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(bearer_token("Bearer"), None);
        assert_eq!(bearer_token(""), None);
        assert_eq!(bearer_token("Basic xyz"), Some("xyz"));
    }
}
