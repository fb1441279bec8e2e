use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::info;

use crate::{
    crud::Resource,
    error::FieldError,
    users::repo_types::{InvitationUpsert, User, UserDetails, UserInsert},
};

#[cfg(test)]
pub mod memory;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    MissingReference(String),
    #[error("validation failed")]
    Invalid(Vec<FieldError>),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::RowNotFound = e {
            return StoreError::NotFound;
        }
        if let Some(db) = e.as_database_error() {
            match db.code().as_deref() {
                Some("23505") => return StoreError::Conflict(unique_message(db.constraint())),
                Some("23503") => return StoreError::MissingReference("User not found".into()),
                _ => {}
            }
        }
        StoreError::Other(e.into())
    }
}

fn unique_message(constraint: Option<&str>) -> String {
    match constraint {
        Some(c) if c.contains("email") => "User already exists".into(),
        _ => "Duplicate value".into(),
    }
}

#[async_trait]
pub trait Repository<R: Resource>: Send + Sync {
    async fn list(&self) -> Result<Vec<R::Record>, StoreError>;
    async fn get(&self, id: i64) -> Result<R::Record, StoreError>;
    async fn create(&self, new: R::New) -> Result<R::Record, StoreError>;
    async fn update(&self, id: i64, patch: R::Patch) -> Result<R::Record, StoreError>;
    async fn delete(&self, id: i64) -> Result<(), StoreError>;
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Fails with [`StoreError::Conflict`] when the email is taken.
    async fn insert(&self, user: UserInsert) -> Result<User, StoreError>;

    /// Insert-or-update keyed on email. An existing password hash is kept;
    /// any earlier invitation token is replaced.
    async fn upsert_invitation(&self, invite: InvitationUpsert) -> Result<User, StoreError>;

    async fn find_by_invitation_token(&self, token: &str) -> Result<Option<User>, StoreError>;

    /// Sets the password and clears all invitation fields in one write, only
    /// if `token` is still the user's current token.
    async fn complete_invitation(
        &self,
        user_id: i64,
        token: &str,
        password_hash: &str,
    ) -> Result<User, StoreError>;

    async fn search(
        &self,
        query: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<UserDetails>, i64), StoreError>;
}

pub trait UserObserver: Send + Sync {
    fn user_saved(&self, user: &UserDetails);
    fn user_deleted(&self, user_id: i64);
}

pub struct LogObserver;

impl UserObserver for LogObserver {
    fn user_saved(&self, user: &UserDetails) {
        info!(user_id = user.id, email = %user.email, "user indexed");
    }

    fn user_deleted(&self, user_id: i64) {
        info!(user_id, "user removed from index");
    }
}

pub fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

pub fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}
