use serde::Deserialize;

use crate::users::repo_types::Role;

/// Body of `POST /api/send-invite`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub role: Option<Role>,
}

/// Body of `POST /api/set-password`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SetPasswordRequest {
    pub token: Option<String>,
    pub password: Option<String>,
}
