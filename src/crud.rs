use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use tracing::{info, instrument};

use crate::{
    auth::extractors::{authorize_role, AuthUser},
    error::{ApiError, AppJson, FieldError},
    state::AppState,
    store::Repository,
    users::repo_types::Role,
};

#[async_trait]
pub trait Resource: Sized + Send + Sync + 'static {
    /// Path segment and cache namespace.
    const NAME: &'static str;
    const LIST_ROLES: &'static [Role];
    const READ_ROLES: &'static [Role];
    const WRITE_ROLES: &'static [Role];

    type Record: Serialize + DeserializeOwned + Send + Sync + 'static;
    type New: DeserializeOwned + Send + 'static;
    type Patch: DeserializeOwned + Send + 'static;

    fn repository(state: &AppState) -> Arc<dyn Repository<Self>>;
    fn record_id(record: &Self::Record) -> i64;
    fn validate_new(new: &Self::New) -> Vec<FieldError>;
    fn validate_patch(patch: &Self::Patch) -> Vec<FieldError>;

    /// Cache keys of rows removed by cascade when record `id` is deleted.
    async fn dependent_keys(_state: &AppState, _id: i64) -> Vec<String> {
        Vec::new()
    }

    fn id_key(id: i64) -> String {
        format!("{}:{}", Self::NAME, id)
    }

    fn all_key() -> String {
        format!("{}:all", Self::NAME)
    }
}

pub fn router<R: Resource>() -> Router<AppState> {
    let collection = format!("/api/{}", R::NAME);
    let member = format!("/api/{}/:id", R::NAME);
    Router::new()
        .route(&collection, get(list::<R>).post(create::<R>))
        .route(&member, get(fetch::<R>).put(update::<R>).delete(remove::<R>))
}

fn reject_invalid(errors: Vec<FieldError>) -> Result<(), ApiError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::InvalidFields(errors))
    }
}

#[instrument(skip_all, fields(resource = R::NAME, caller = caller.id))]
async fn list<R: Resource>(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
) -> Result<Json<Vec<R::Record>>, ApiError> {
    authorize_role(&caller, R::LIST_ROLES)?;
    let repo = R::repository(&state);
    let records = state
        .cache
        .get_or_load(&R::all_key(), || async move { repo.list().await })
        .await?;
    Ok(Json(records))
}

#[instrument(skip_all, fields(resource = R::NAME, caller = caller.id, id = id))]
async fn fetch<R: Resource>(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<R::Record>, ApiError> {
    authorize_role(&caller, R::READ_ROLES)?;
    let repo = R::repository(&state);
    let record = state
        .cache
        .get_or_load(&R::id_key(id), || async move { repo.get(id).await })
        .await?;
    Ok(Json(record))
}

#[instrument(skip_all, fields(resource = R::NAME, caller = caller.id))]
async fn create<R: Resource>(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    AppJson(new): AppJson<R::New>,
) -> Result<(StatusCode, Json<R::Record>), ApiError> {
    authorize_role(&caller, R::WRITE_ROLES)?;
    reject_invalid(R::validate_new(&new))?;
    let record = R::repository(&state).create(new).await?;
    let id = R::record_id(&record);
    state.cache.invalidate_all(&[R::id_key(id), R::all_key()]).await;
    info!(id, "record created");
    Ok((StatusCode::CREATED, Json(record)))
}

#[instrument(skip_all, fields(resource = R::NAME, caller = caller.id, id = id))]
async fn update<R: Resource>(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<i64>,
    AppJson(patch): AppJson<R::Patch>,
) -> Result<Json<R::Record>, ApiError> {
    authorize_role(&caller, R::WRITE_ROLES)?;
    reject_invalid(R::validate_patch(&patch))?;
    let record = R::repository(&state).update(id, patch).await?;
    state.cache.invalidate_all(&[R::id_key(id), R::all_key()]).await;
    info!("record updated");
    Ok(Json(record))
}

#[instrument(skip_all, fields(resource = R::NAME, caller = caller.id, id = id))]
async fn remove<R: Resource>(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    authorize_role(&caller, R::WRITE_ROLES)?;
    let mut keys = R::dependent_keys(&state, id).await;
    R::repository(&state).delete(id).await?;
    keys.push(R::id_key(id));
    keys.push(R::all_key());
    state.cache.invalidate_all(&keys).await;
    info!("record deleted");
    Ok(Json(json!({ "message": "Deleted successfully" })))
}
