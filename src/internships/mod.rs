use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;

use crate::{
    crud::{self, Resource},
    error::FieldError,
    state::AppState,
    store::Repository,
    users::repo_types::Role,
};
use repo_types::{Internship, InternshipPatch, NewInternship};

pub mod repo;
pub mod repo_types;

/// `/api/internshipdetails`.
pub struct Internships;

#[async_trait]
impl Resource for Internships {
    const NAME: &'static str = "internshipdetails";
    const LIST_ROLES: &'static [Role] = &[Role::Admin];
    const READ_ROLES: &'static [Role] = &[Role::Admin, Role::User];
    const WRITE_ROLES: &'static [Role] = &[Role::Admin];

    type Record = Internship;
    type New = NewInternship;
    type Patch = InternshipPatch;

    fn repository(state: &AppState) -> Arc<dyn Repository<Self>> {
        state.internships.clone()
    }

    fn record_id(record: &Internship) -> i64 {
        record.id
    }

    fn validate_new(new: &NewInternship) -> Vec<FieldError> {
        new.validate()
    }

    fn validate_patch(patch: &InternshipPatch) -> Vec<FieldError> {
        patch.validate()
    }
}

pub fn router() -> Router<AppState> {
    crud::router::<Internships>()
}
