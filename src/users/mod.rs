use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;

use crate::{
    crud::{self, Resource},
    error::FieldError,
    internships::Internships,
    state::AppState,
    store::Repository,
};
use repo_types::{NewUser, Role, UserDetails, UserPatch};

pub mod handlers;
pub mod repo;
pub mod repo_types;

/// `/api/userdetails`: admins list and write, any signed-in caller reads one.
pub struct Users;

#[async_trait]
impl Resource for Users {
    const NAME: &'static str = "userdetails";
    const LIST_ROLES: &'static [Role] = &[Role::Admin];
    const READ_ROLES: &'static [Role] = &[Role::Admin, Role::User];
    const WRITE_ROLES: &'static [Role] = &[Role::Admin];

    type Record = UserDetails;
    type New = NewUser;
    type Patch = UserPatch;

    fn repository(state: &AppState) -> Arc<dyn Repository<Self>> {
        state.users.clone()
    }

    fn record_id(record: &UserDetails) -> i64 {
        record.id
    }

    fn validate_new(new: &NewUser) -> Vec<FieldError> {
        new.validate()
    }

    fn validate_patch(patch: &UserPatch) -> Vec<FieldError> {
        patch.validate()
    }

    /// Internships go with their owner.
    async fn dependent_keys(state: &AppState, id: i64) -> Vec<String> {
        let mut keys = vec![Internships::all_key()];
        match state.internships.list().await {
            Ok(rows) => keys.extend(
                rows.iter()
                    .filter(|i| i.user_id == id)
                    .map(|i| Internships::id_key(i.id)),
            ),
            Err(e) => tracing::warn!(error = %e, user_id = id, "could not resolve cascaded internships"),
        }
        keys
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(crud::router::<Users>())
        .merge(handlers::search_routes())
}
