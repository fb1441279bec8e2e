use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;

use super::{
    repo_types::{Internship, InternshipPatch, NewInternship},
    Internships,
};
use crate::store::{Repository, StoreError};

pub struct PgInternships {
    db: PgPool,
}

impl PgInternships {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Repository<Internships> for PgInternships {
    async fn list(&self) -> Result<Vec<Internship>, StoreError> {
        let rows = sqlx::query_as::<_, Internship>(r#"SELECT * FROM internships ORDER BY id"#)
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }

    async fn get(&self, id: i64) -> Result<Internship, StoreError> {
        let row = sqlx::query_as::<_, Internship>(r#"SELECT * FROM internships WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(StoreError::NotFound)?;
        Ok(row)
    }

    /// An unknown `userId` trips the foreign key and surfaces as
    /// [`StoreError::MissingReference`].
    async fn create(&self, new: NewInternship) -> Result<Internship, StoreError> {
        let new = new
            .into_insert()
            .ok_or_else(|| StoreError::Other(anyhow::anyhow!("unvalidated internship payload")))?;
        let row = sqlx::query_as::<_, Internship>(
            r#"
            INSERT INTO internships (user_id, company_name, start_date, end_date, mentor_name)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(new.user_id)
        .bind(&new.company_name)
        .bind(new.start_date)
        .bind(new.end_date)
        .bind(&new.mentor_name)
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    async fn update(&self, id: i64, patch: InternshipPatch) -> Result<Internship, StoreError> {
        let mut tx = self.db.begin().await.context("begin tx")?;
        let mut row =
            sqlx::query_as::<_, Internship>(r#"SELECT * FROM internships WHERE id = $1 FOR UPDATE"#)
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(StoreError::NotFound)?;

        let errors = patch.apply(&mut row);
        if !errors.is_empty() {
            return Err(StoreError::Invalid(errors));
        }

        let row = sqlx::query_as::<_, Internship>(
            r#"
            UPDATE internships
               SET user_id = $2, company_name = $3, start_date = $4, end_date = $5,
                   mentor_name = $6, updated_at = now()
             WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(row.user_id)
        .bind(&row.company_name)
        .bind(row.start_date)
        .bind(row.end_date)
        .bind(&row.mentor_name)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await.context("commit tx")?;
        Ok(row)
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let done = sqlx::query(r#"DELETE FROM internships WHERE id = $1"#)
            .bind(id)
            .execute(&self.db)
            .await?;
        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
