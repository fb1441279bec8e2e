use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::repo_types::UserDetails;
use crate::{auth::extractors::AuthUser, error::ApiError, state::AppState};

pub fn search_routes() -> Router<AppState> {
    Router::new().route("/api/search", get(search))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub q: Option<String>,
    pub page: Option<String>,
    pub page_size: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<UserDetails>,
    pub total_results: i64,
    pub current_page: i64,
    pub total_pages: i64,
}

/// Non-numeric or non-positive values fall back to the default.
fn positive(raw: Option<&str>, default: i64) -> i64 {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

#[instrument(skip(state, params), fields(caller = caller.id))]
pub async fn search(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let query = params
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::BadQuery(r#"Query parameter "q" is required"#.into()))?;
    let page = positive(params.page.as_deref(), 1);
    let page_size = positive(params.page_size.as_deref(), 10).min(100);

    let offset = (page - 1)
        .checked_mul(page_size)
        .ok_or_else(|| ApiError::BadQuery(r#"Query parameter "page" is out of range"#.into()))?;

    let (results, total) = state.credentials.search(query, page_size, offset).await?;

    Ok(Json(SearchResponse {
        results,
        total_results: total,
        current_page: page,
        total_pages: (total + page_size - 1) / page_size,
    }))
}
