use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{LoginRequest, LoginResponse, PublicUser, RegisterRequest, RegisterResponse},
        extractors::AuthUser,
        password,
    },
    crud::Resource,
    error::{ApiError, AppJson},
    state::AppState,
    store::StoreError,
    users::{
        repo_types::{is_valid_email, normalize_email, Role, UserInsert},
        Users,
    },
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/me", get(me))
}

fn invalid_credentials() -> ApiError {
    ApiError::Unauthenticated("Invalid credentials".into())
}

fn required(value: Option<String>, message: &str) -> Result<String, ApiError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::Validation(message.into()))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let first_name = required(payload.first_name, "First name is required")?;
    let last_name = required(payload.last_name, "Last name is required")?;
    let email = normalize_email(&required(payload.email, "Email is required")?);
    let plain = payload
        .password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::Validation("Password is required".into()))?;

    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(ApiError::Validation("Invalid email".into()));
    }

    if state.credentials.find_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(ApiError::Conflict("User already exists".into()));
    }

    let hash = password::hash(plain).await.map_err(|e| {
        error!(error = %e, "hash_password failed");
        ApiError::internal("Server error during registration", e)
    })?;

    let role = if payload.is_admin { Role::Admin } else { Role::User };
    let user = match state
        .credentials
        .insert(UserInsert {
            first_name,
            last_name,
            email,
            phone: payload.phone,
            address: payload.address,
            password_hash: Some(hash),
            role,
        })
        .await
    {
        Ok(u) => u,
        // Lost a race with a concurrent registration of the same email.
        Err(StoreError::Conflict(_)) => return Err(ApiError::Conflict("User already exists".into())),
        Err(e) => {
            error!(error = %e, "create user failed");
            return Err(ApiError::internal("Server error during registration", e));
        }
    };
    state.cache.invalidate(&Users::all_key()).await;

    let token = state.jwt.sign(&user.identity())?;

    info!(user_id = user.id, email = %user.email, role = ?user.role, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User created successfully",
            token,
            user: PublicUser::from(&user),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let (Some(email), Some(plain)) = (payload.email, payload.password) else {
        return Err(invalid_credentials());
    };
    let email = normalize_email(&email);

    let user = match state.credentials.find_by_email(&email).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            warn!(email = %email, "login unknown email");
            return Err(invalid_credentials());
        }
        Err(e) => {
            error!(error = %e, "find_by_email failed");
            return Err(ApiError::internal("Server error during login", e));
        }
    };

    // Invited users have no password until they accept.
    let Some(hash) = user.password_hash.clone() else {
        warn!(user_id = user.id, "login before invitation accepted");
        return Err(invalid_credentials());
    };

    let ok = password::verify(plain, hash).await.map_err(|e| {
        error!(error = %e, "verify_password failed");
        ApiError::internal("Server error during login", e)
    })?;

    if !ok {
        warn!(email = %email, user_id = user.id, "login invalid password");
        return Err(invalid_credentials());
    }

    let token = state.jwt.sign(&user.identity())?;

    info!(user_id = user.id, email = %user.email, "user logged in");
    Ok(Json(LoginResponse {
        token,
        user: PublicUser::from(&user),
    }))
}

#[instrument(skip_all)]
pub async fn me(AuthUser(caller): AuthUser) -> Json<PublicUser> {
    Json(PublicUser {
        id: caller.id,
        email: caller.email,
        role: caller.role,
    })
}

#[cfg(test)]
mod me_tests {
    use super::*;

    #[test]
    fn test_public_user_serialization() {
        let response = PublicUser {
            id: 42,
            email: "test@example.com".to_string(),
            role: Role::Admin,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("test@example.com"));
        assert!(json.contains("\"role\":\"admin\""));
    }
}
