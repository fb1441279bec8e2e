use std::sync::Arc;

use axum::extract::FromRef;
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{info, warn};

use super::dto::InviteRequest;
use crate::{
    auth::password,
    cache::Cache,
    config::{InviteConfig, MailConfig},
    crud::Resource,
    mail::{Mailer, OutgoingEmail},
    state::AppState,
    store::{CredentialStore, StoreError},
    users::{
        repo_types::{is_valid_email, normalize_email, InvitationUpsert, User},
        Users,
    },
};

const TOKEN_BYTES: usize = 20;

#[derive(Debug, Error)]
pub enum InvitationError {
    #[error("{0}")]
    Validation(String),
    #[error("Token and password are required")]
    MissingFields,
    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,
    #[error("Token has expired")]
    TokenExpired,
    #[error("sending invitation mail failed: {0}")]
    Mail(anyhow::Error),
    #[error(transparent)]
    Store(anyhow::Error),
    #[error("password hashing failed: {0}")]
    Hash(anyhow::Error),
}

impl From<StoreError> for InvitationError {
    fn from(e: StoreError) -> Self {
        InvitationError::Store(e.into())
    }
}

pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[derive(Clone)]
pub struct Invitations {
    store: Arc<dyn CredentialStore>,
    mailer: Arc<dyn Mailer>,
    cache: Cache,
    invite: InviteConfig,
    from: String,
}

impl FromRef<AppState> for Invitations {
    fn from_ref(state: &AppState) -> Self {
        Invitations::new(
            state.credentials.clone(),
            state.mailer.clone(),
            state.cache.clone(),
            &state.config.invite,
            &state.config.mail,
        )
    }
}

fn required(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl Invitations {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        mailer: Arc<dyn Mailer>,
        cache: Cache,
        invite: &InviteConfig,
        mail: &MailConfig,
    ) -> Self {
        Self {
            store,
            mailer,
            cache,
            invite: invite.clone(),
            from: mail.from.clone(),
        }
    }

    pub fn link(&self, token: &str) -> String {
        format!("{}?token={}", self.invite.link_base, token)
    }

    async fn forget_cached(&self, user_id: i64) {
        self.cache
            .invalidate_all(&[Users::id_key(user_id), Users::all_key()])
            .await;
    }

    /// Creates or refreshes the invitee's record with a new token and mails
    /// the link. Re-inviting an email replaces its previous token.
    pub async fn send(&self, req: InviteRequest) -> Result<User, InvitationError> {
        let (Some(first_name), Some(last_name), Some(email), Some(role)) = (
            required(&req.first_name),
            required(&req.last_name),
            required(&req.email),
            req.role,
        ) else {
            return Err(InvitationError::Validation(
                "First name, last name, email, and role are required".into(),
            ));
        };
        let email = normalize_email(&email);
        if !is_valid_email(&email) {
            return Err(InvitationError::Validation("Invalid email".into()));
        }

        let token = generate_token();
        let created_at = OffsetDateTime::now_utc();
        let expires_at = created_at + TimeDuration::hours(self.invite.ttl_hours.max(1));

        let user = self
            .store
            .upsert_invitation(InvitationUpsert {
                first_name,
                last_name,
                email,
                phone: req.phone,
                address: req.address,
                role,
                token: token.clone(),
                created_at,
                expires_at,
            })
            .await?;
        self.forget_cached(user.id).await;

        let email = OutgoingEmail {
            from: self.from.clone(),
            to: vec![user.email.clone()],
            subject: "Invitation to Join".into(),
            text: format!(
                "Hello {} {},\n\nYou have been invited to join our platform. Click the following link to set your password and complete your profile: {}\n\nBest regards,\nTeam",
                user.first_name,
                user.last_name,
                self.link(&token)
            ),
        };
        self.mailer.send(email).await.map_err(InvitationError::Mail)?;

        info!(user_id = user.id, email = %user.email, expires_at = %expires_at, "invitation sent");
        Ok(user)
    }

    /// Redeems `token`, setting the password and clearing the invitation.
    /// Succeeds at most once per token.
    pub async fn consume(
        &self,
        token: Option<&str>,
        new_password: Option<&str>,
    ) -> Result<User, InvitationError> {
        let (Some(token), Some(new_password)) = (
            token.filter(|t| !t.is_empty()),
            new_password.filter(|p| !p.is_empty()),
        ) else {
            return Err(InvitationError::MissingFields);
        };

        let user = self
            .store
            .find_by_invitation_token(token)
            .await?
            .ok_or(InvitationError::InvalidOrExpiredToken)?;

        if user.invitation_expired(OffsetDateTime::now_utc()) {
            warn!(user_id = user.id, "expired invitation token presented");
            return Err(InvitationError::TokenExpired);
        }

        let hash = password::hash(new_password.to_string())
            .await
            .map_err(InvitationError::Hash)?;

        let user = match self.store.complete_invitation(user.id, token, &hash).await {
            Ok(u) => u,
            // Redeemed or replaced between lookup and write.
            Err(StoreError::NotFound) => return Err(InvitationError::InvalidOrExpiredToken),
            Err(e) => return Err(e.into()),
        };
        self.forget_cached(user.id).await;
        info!(user_id = user.id, "invitation accepted");
        Ok(user)
    }
}
