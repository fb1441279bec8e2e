use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};

use crate::error::FieldError;

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Internship {
    pub id: i64,
    pub user_id: i64,
    pub company_name: String,
    #[serde(with = "iso_date")]
    pub start_date: Date,
    #[serde(with = "iso_date")]
    pub end_date: Date,
    pub mentor_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInternship {
    pub user_id: Option<i64>,
    pub company_name: Option<String>,
    #[serde(default, with = "iso_date::option")]
    pub start_date: Option<Date>,
    #[serde(default, with = "iso_date::option")]
    pub end_date: Option<Date>,
    pub mentor_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternshipPatch {
    pub user_id: Option<i64>,
    pub company_name: Option<String>,
    #[serde(default, with = "iso_date::option")]
    pub start_date: Option<Date>,
    #[serde(default, with = "iso_date::option")]
    pub end_date: Option<Date>,
    pub mentor_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InternshipInsert {
    pub user_id: i64,
    pub company_name: String,
    pub start_date: Date,
    pub end_date: Date,
    pub mentor_name: String,
}

fn blank(v: &Option<String>) -> bool {
    v.as_deref().map_or(true, |s| s.trim().is_empty())
}

pub fn check_dates(start: Date, end: Date) -> Vec<FieldError> {
    if end < start {
        vec![FieldError::new("endDate", "endDate must not be before startDate")]
    } else {
        Vec::new()
    }
}

impl NewInternship {
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if self.user_id.is_none() {
            errors.push(FieldError::new("userId", "userId is required"));
        }
        if blank(&self.company_name) {
            errors.push(FieldError::new("companyName", "companyName is required"));
        }
        if self.start_date.is_none() {
            errors.push(FieldError::new("startDate", "startDate is required"));
        }
        if self.end_date.is_none() {
            errors.push(FieldError::new("endDate", "endDate is required"));
        }
        if blank(&self.mentor_name) {
            errors.push(FieldError::new("mentorName", "mentorName is required"));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            errors.extend(check_dates(start, end));
        }
        errors
    }

    pub fn into_insert(self) -> Option<InternshipInsert> {
        Some(InternshipInsert {
            user_id: self.user_id?,
            company_name: self.company_name?.trim().to_string(),
            start_date: self.start_date?,
            end_date: self.end_date?,
            mentor_name: self.mentor_name?.trim().to_string(),
        })
    }
}

impl InternshipPatch {
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if matches!(self.company_name.as_deref(), Some(s) if s.trim().is_empty()) {
            errors.push(FieldError::new("companyName", "companyName must not be empty"));
        }
        if matches!(self.mentor_name.as_deref(), Some(s) if s.trim().is_empty()) {
            errors.push(FieldError::new("mentorName", "mentorName must not be empty"));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            errors.extend(check_dates(start, end));
        }
        errors
    }

    /// Merges the patch into `row` and re-checks the date range.
    pub fn apply(&self, row: &mut Internship) -> Vec<FieldError> {
        if let Some(v) = self.user_id {
            row.user_id = v;
        }
        if let Some(v) = &self.company_name {
            row.company_name = v.trim().to_string();
        }
        if let Some(v) = self.start_date {
            row.start_date = v;
        }
        if let Some(v) = self.end_date {
            row.end_date = v;
        }
        if let Some(v) = &self.mentor_name {
            row.mentor_name = v.trim().to_string();
        }
        check_dates(row.start_date, row.end_date)
    }
}
