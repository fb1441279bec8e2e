use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;

use super::claims::{Claims, Identity};
use crate::{config::JwtConfig, state::AppState};

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Access token required")]
    Missing,
    #[error("Invalid token")]
    Invalid,
    #[error("Token has expired")]
    Expired,
    #[error("Token signing failed: {0}")]
    Signing(String),
}

/// Signs and verifies bearer tokens. Tokens are never stored server-side,
/// so a leaked token stays usable until it expires.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: Option<EncodingKey>,
    decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}

impl JwtKeys {
    pub fn new(cfg: &JwtConfig) -> Self {
        let JwtConfig {
            secret,
            issuer,
            audience,
            ttl_minutes,
        } = cfg.clone();
        let encoding = (!secret.is_empty()).then(|| EncodingKey::from_secret(secret.as_bytes()));
        Self {
            encoding,
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            audience,
            ttl: Duration::from_secs((ttl_minutes.max(0) as u64) * 60),
        }
    }

    pub fn sign(&self, identity: &Identity) -> Result<String, TokenError> {
        self.issue(identity, TimeDuration::seconds(self.ttl.as_secs() as i64))
    }

    pub fn issue(&self, identity: &Identity, ttl: TimeDuration) -> Result<String, TokenError> {
        self.issue_at(identity, OffsetDateTime::now_utc(), ttl)
    }

    pub fn issue_at(
        &self,
        identity: &Identity,
        issued_at: OffsetDateTime,
        ttl: TimeDuration,
    ) -> Result<String, TokenError> {
        let encoding = self
            .encoding
            .as_ref()
            .ok_or_else(|| TokenError::Signing("signing key unavailable".into()))?;
        let exp = issued_at + ttl;
        let claims = Claims {
            id: identity.id,
            email: identity.email.clone(),
            role: identity.role,
            iat: issued_at.unix_timestamp().max(0) as usize,
            exp: exp.unix_timestamp().max(0) as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;
        debug!(user_id = identity.id, role = ?identity.role, "jwt signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(TokenError::Missing);
        }
        let mut validation = Validation::default();
        validation.leeway = 0;
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            }
        })?;
        debug!(user_id = data.claims.id, role = ?data.claims.role, "jwt verified");
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::repo_types::Role;

    fn make_keys(secret: &str, issuer: &str, audience: &str) -> JwtKeys {
        JwtKeys::new(&JwtConfig {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            ttl_minutes: 60,
        })
    }

    fn admin() -> Identity {
        Identity {
            id: 7,
            email: "boss@example.com".into(),
            role: Role::Admin,
        }
    }

    #[test]
    fn sign_and_verify_carries_identity() {
        let keys = make_keys("dev-secret", "test-issuer", "test-aud");
        let token = keys.sign(&admin()).expect("sign");
        let claims = keys.verify(&token).expect("verify");
        assert_eq!(claims.identity(), admin());
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn token_valid_just_inside_the_hour() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let issued = OffsetDateTime::now_utc() - TimeDuration::minutes(59);
        let token = keys.issue_at(&admin(), issued, TimeDuration::hours(1)).unwrap();
        assert!(keys.verify(&token).is_ok());
    }

    #[test]
    fn token_expires_after_the_hour() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let issued = OffsetDateTime::now_utc() - TimeDuration::minutes(61);
        let token = keys.issue_at(&admin(), issued, TimeDuration::hours(1)).unwrap();
        assert!(matches!(keys.verify(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn verify_rejects_foreign_signature() {
        let ours = make_keys("secret-a", "iss", "aud");
        let theirs = make_keys("secret-b", "iss", "aud");
        let token = theirs.sign(&admin()).unwrap();
        assert!(matches!(ours.verify(&token), Err(TokenError::Invalid)));
    }

    #[test]
    fn verify_rejects_wrong_issuer_or_audience() {
        let good = make_keys("same-secret", "good-iss", "good-aud");
        let bad = make_keys("same-secret", "bad-iss", "bad-aud");
        let token = good.sign(&admin()).unwrap();
        assert!(matches!(bad.verify(&token), Err(TokenError::Invalid)));
    }

    #[test]
    fn verify_distinguishes_missing_from_garbage() {
        let keys = make_keys("dev-secret", "iss", "aud");
        assert!(matches!(keys.verify(""), Err(TokenError::Missing)));
        assert!(matches!(keys.verify("not.a.jwt"), Err(TokenError::Invalid)));
    }

    #[test]
    fn signing_fails_without_a_key() {
        let keys = make_keys("", "iss", "aud");
        assert!(matches!(keys.sign(&admin()), Err(TokenError::Signing(_))));
    }
}
