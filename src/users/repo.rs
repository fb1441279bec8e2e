use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;

use super::{
    repo_types::{InvitationUpsert, NewUser, Role, User, UserDetails, UserInsert, UserPatch},
    Users,
};
use crate::{
    auth::password,
    store::{like_pattern, CredentialStore, Repository, StoreError, UserObserver},
};

pub struct PgUsers {
    db: PgPool,
    observer: Arc<dyn UserObserver>,
}

impl PgUsers {
    pub fn new(db: PgPool, observer: Arc<dyn UserObserver>) -> Self {
        Self { db, observer }
    }

    fn saved(&self, user: User) -> User {
        self.observer.user_saved(&user.details());
        user
    }
}

pub(crate) async fn hash_optional(plain: Option<String>) -> Result<Option<String>, StoreError> {
    match plain {
        Some(p) => Ok(Some(password::hash(p).await.context("hash password")?)),
        None => Ok(None),
    }
}

pub(crate) async fn prepare_insert(new: NewUser) -> Result<UserInsert, StoreError> {
    let (Some(first_name), Some(last_name), Some(email)) = (new.first_name, new.last_name, new.email)
    else {
        return Err(StoreError::Other(anyhow::anyhow!("unvalidated user payload")));
    };
    Ok(UserInsert {
        first_name: first_name.trim().to_string(),
        last_name: last_name.trim().to_string(),
        email: super::repo_types::normalize_email(&email),
        phone: new.phone,
        address: new.address,
        password_hash: hash_optional(new.password).await?,
        role: new.role.unwrap_or(Role::User),
    })
}

#[async_trait]
impl CredentialStore for PgUsers {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT *
            FROM users
            WHERE lower(email) = lower($1)
            "#,
        )
        .bind(email.trim())
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn insert(&self, user: UserInsert) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (first_name, last_name, email, phone, address, password_hash, role)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.address)
        .bind(&user.password_hash)
        .bind(user.role)
        .fetch_one(&self.db)
        .await?;
        Ok(self.saved(user))
    }

    async fn upsert_invitation(&self, invite: InvitationUpsert) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (first_name, last_name, email, phone, address, role,
                               invitation_token, invitation_created_at, token_expiration)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (email) DO UPDATE SET
                first_name            = EXCLUDED.first_name,
                last_name             = EXCLUDED.last_name,
                phone                 = COALESCE(EXCLUDED.phone, users.phone),
                address               = COALESCE(EXCLUDED.address, users.address),
                role                  = EXCLUDED.role,
                invitation_token      = EXCLUDED.invitation_token,
                invitation_created_at = EXCLUDED.invitation_created_at,
                token_expiration      = EXCLUDED.token_expiration,
                updated_at            = now()
            RETURNING *
            "#,
        )
        .bind(&invite.first_name)
        .bind(&invite.last_name)
        .bind(&invite.email)
        .bind(&invite.phone)
        .bind(&invite.address)
        .bind(invite.role)
        .bind(&invite.token)
        .bind(invite.created_at)
        .bind(invite.expires_at)
        .fetch_one(&self.db)
        .await?;
        Ok(self.saved(user))
    }

    async fn find_by_invitation_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(r#"SELECT * FROM users WHERE invitation_token = $1"#)
            .bind(token)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn complete_invitation(
        &self,
        user_id: i64,
        token: &str,
        password_hash: &str,
    ) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
               SET password_hash         = $3,
                   invitation_token      = NULL,
                   invitation_created_at = NULL,
                   token_expiration      = NULL,
                   updated_at            = now()
             WHERE id = $1 AND invitation_token = $2
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(token)
        .bind(password_hash)
        .fetch_optional(&self.db)
        .await?
        .ok_or(StoreError::NotFound)?;
        Ok(self.saved(user))
    }

    async fn search(
        &self,
        query: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<UserDetails>, i64), StoreError> {
        let pattern = like_pattern(query);
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
              FROM users
             WHERE first_name ILIKE $1 ESCAPE '\'
                OR last_name  ILIKE $1 ESCAPE '\'
                OR email      ILIKE $1 ESCAPE '\'
            "#,
        )
        .bind(&pattern)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, User>(
            r#"
            SELECT *
              FROM users
             WHERE first_name ILIKE $1 ESCAPE '\'
                OR last_name  ILIKE $1 ESCAPE '\'
                OR email      ILIKE $1 ESCAPE '\'
             ORDER BY id
             LIMIT $2 OFFSET $3
            "#,
        )
        .bind(&pattern)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        Ok((rows.iter().map(User::details).collect(), total))
    }
}

#[async_trait]
impl Repository<Users> for PgUsers {
    async fn list(&self) -> Result<Vec<UserDetails>, StoreError> {
        let rows = sqlx::query_as::<_, User>(r#"SELECT * FROM users ORDER BY id"#)
            .fetch_all(&self.db)
            .await?;
        Ok(rows.iter().map(User::details).collect())
    }

    async fn get(&self, id: i64) -> Result<UserDetails, StoreError> {
        let user = sqlx::query_as::<_, User>(r#"SELECT * FROM users WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(StoreError::NotFound)?;
        Ok(user.details())
    }

    async fn create(&self, new: NewUser) -> Result<UserDetails, StoreError> {
        let insert = prepare_insert(new).await?;
        Ok(self.insert(insert).await?.details())
    }

    async fn update(&self, id: i64, patch: UserPatch) -> Result<UserDetails, StoreError> {
        // Hash before taking the row lock.
        let password_hash = hash_optional(patch.password.clone()).await?;

        let mut tx = self.db.begin().await.context("begin tx")?;
        let mut user = sqlx::query_as::<_, User>(r#"SELECT * FROM users WHERE id = $1 FOR UPDATE"#)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound)?;

        patch.apply(&mut user);
        if let Some(hash) = password_hash {
            user.set_password_hash(hash);
        }

        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
               SET first_name = $2, last_name = $3, email = $4, phone = $5,
                   address = $6, password_hash = $7, role = $8,
                   invitation_token = $9, invitation_created_at = $10,
                   token_expiration = $11, updated_at = now()
             WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.address)
        .bind(&user.password_hash)
        .bind(user.role)
        .bind(&user.invitation_token)
        .bind(user.invitation_created_at)
        .bind(user.token_expiration)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await.context("commit tx")?;

        Ok(self.saved(user).details())
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let done = sqlx::query(r#"DELETE FROM users WHERE id = $1"#)
            .bind(id)
            .execute(&self.db)
            .await?;
        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        self.observer.user_deleted(id);
        Ok(())
    }
}
