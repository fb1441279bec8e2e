use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

use crate::{auth::claims::Identity, error::FieldError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

/// Full user row, secrets included. Never serialized to clients.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub password_hash: Option<String>,
    pub role: Role,
    pub invitation_token: Option<String>,
    pub invitation_created_at: Option<OffsetDateTime>,
    pub token_expiration: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    pub fn details(&self) -> UserDetails {
        UserDetails {
            id: self.id,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            address: self.address.clone(),
            role: self.role,
            has_password: self.password_hash.is_some(),
            invitation_pending: self.invitation_token.is_some(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn identity(&self) -> Identity {
        Identity {
            id: self.id,
            email: self.email.clone(),
            role: self.role,
        }
    }

    /// A password ends any pending invitation.
    pub fn set_password_hash(&mut self, hash: String) {
        self.password_hash = Some(hash);
        self.invitation_token = None;
        self.invitation_created_at = None;
        self.token_expiration = None;
    }

    pub fn invitation_expired(&self, now: OffsetDateTime) -> bool {
        self.token_expiration.map_or(true, |exp| now > exp)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDetails {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub role: Role,
    pub has_password: bool,
    pub invitation_pending: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
}

/// Body of `PUT /api/userdetails/:id`; absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
}

#[derive(Debug, Clone)]
pub struct UserInsert {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub password_hash: Option<String>,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct InvitationUpsert {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub role: Role,
    pub token: String,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    use lazy_static::lazy_static;
    use regex::Regex;
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn present(v: &Option<String>) -> bool {
    v.as_deref().is_some_and(|s| !s.trim().is_empty())
}

impl NewUser {
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if !present(&self.first_name) {
            errors.push(FieldError::new("firstName", "firstName is required"));
        }
        if !present(&self.last_name) {
            errors.push(FieldError::new("lastName", "lastName is required"));
        }
        match self.email.as_deref() {
            Some(e) if is_valid_email(&normalize_email(e)) => {}
            Some(_) => errors.push(FieldError::new("email", "email is invalid")),
            None => errors.push(FieldError::new("email", "email is required")),
        }
        if matches!(self.password.as_deref(), Some(p) if p.is_empty()) {
            errors.push(FieldError::new("password", "password must not be empty"));
        }
        errors
    }
}

impl UserPatch {
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if matches!(self.first_name.as_deref(), Some(s) if s.trim().is_empty()) {
            errors.push(FieldError::new("firstName", "firstName must not be empty"));
        }
        if matches!(self.last_name.as_deref(), Some(s) if s.trim().is_empty()) {
            errors.push(FieldError::new("lastName", "lastName must not be empty"));
        }
        if matches!(self.email.as_deref(), Some(e) if !is_valid_email(&normalize_email(e))) {
            errors.push(FieldError::new("email", "email is invalid"));
        }
        if matches!(self.password.as_deref(), Some(p) if p.is_empty()) {
            errors.push(FieldError::new("password", "password must not be empty"));
        }
        errors
    }

    /// Applies the non-password fields. The password is hashed by the store.
    pub fn apply(&self, user: &mut User) {
        if let Some(v) = &self.first_name {
            user.first_name = v.trim().to_string();
        }
        if let Some(v) = &self.last_name {
            user.last_name = v.trim().to_string();
        }
        if let Some(v) = &self.email {
            user.email = normalize_email(v);
        }
        if let Some(v) = &self.phone {
            user.phone = Some(v.clone());
        }
        if let Some(v) = &self.address {
            user.address = Some(v.clone());
        }
        if let Some(v) = self.role {
            user.role = v;
        }
    }
}
