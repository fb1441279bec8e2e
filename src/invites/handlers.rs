use axum::{extract::State, routing::post, Json, Router};
use serde_json::{json, Value};
use tracing::{info, instrument};

use super::{
    dto::{InviteRequest, SetPasswordRequest},
    services::Invitations,
};
use crate::{
    auth::extractors::{authorize_role, AuthUser},
    error::{ApiError, AppJson},
    state::AppState,
    users::repo_types::Role,
};

pub fn invite_routes() -> Router<AppState> {
    Router::new()
        .route("/api/send-invite", post(send_invite))
        .route("/api/set-password", post(set_password))
}

#[instrument(skip(invitations, payload), fields(caller = caller.id))]
pub async fn send_invite(
    State(invitations): State<Invitations>,
    AuthUser(caller): AuthUser,
    AppJson(payload): AppJson<InviteRequest>,
) -> Result<Json<Value>, ApiError> {
    authorize_role(&caller, &[Role::Admin])?;
    invitations.send(payload).await?;
    Ok(Json(json!({ "message": "Invitation sent successfully" })))
}

#[instrument(skip_all)]
pub async fn set_password(
    State(invitations): State<Invitations>,
    AppJson(payload): AppJson<SetPasswordRequest>,
) -> Result<Json<Value>, ApiError> {
    let user = invitations
        .consume(payload.token.as_deref(), payload.password.as_deref())
        .await?;
    info!(user_id = user.id, "password set from invitation");
    Ok(Json(json!({ "message": "Password set and user profile updated successfully" })))
}
