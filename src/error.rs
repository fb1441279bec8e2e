use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::{auth::jwt::TokenError, invites::services::InvitationError, store::StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("Validation error")]
    InvalidFields(Vec<FieldError>),
    #[error("{0}")]
    BadQuery(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("Not found")]
    NotFound,
    #[error("{0}")]
    MissingReference(String),
    #[error("{message}: {source}")]
    Internal {
        message: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl ApiError {
    pub fn internal(message: &'static str, source: impl Into<anyhow::Error>) -> Self {
        ApiError::Internal {
            message,
            source: source.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_)
            | ApiError::InvalidFields(_)
            | ApiError::BadQuery(_)
            | ApiError::Conflict(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound | ApiError::MissingReference(_) => StatusCode::NOT_FOUND,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::InvalidFields(details) => {
                json!({ "error": "Validation error", "details": details })
            }
            ApiError::BadQuery(error) => json!({ "error": error }),
            ApiError::NotFound => json!({ "error": "Not found" }),
            ApiError::Internal { message, source } => {
                tracing::error!(error = %source, "{}", message);
                json!({ "message": message, "error": source.to_string() })
            }
            ApiError::Validation(message)
            | ApiError::Conflict(message)
            | ApiError::Unauthenticated(message)
            | ApiError::Forbidden(message)
            | ApiError::MissingReference(message) => json!({ "message": message }),
        };
        (status, Json(body)).into_response()
    }
}

/// `Json` body whose rejection is a 400 `ApiError` instead of axum's
/// plain-text 422.
pub struct AppJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for AppJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(AppJson(value))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::warn!(error = %rejection.body_text(), "rejected request body");
        ApiError::Validation(rejection.body_text())
    }
}

impl From<TokenError> for ApiError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Missing => ApiError::Unauthenticated(e.to_string()),
            TokenError::Invalid | TokenError::Expired => {
                ApiError::Forbidden("Invalid or expired token".into())
            }
            TokenError::Signing(_) => ApiError::internal("Error issuing token", e),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ApiError::NotFound,
            StoreError::Conflict(message) => ApiError::Conflict(message),
            StoreError::MissingReference(message) => ApiError::MissingReference(message),
            StoreError::Invalid(details) => ApiError::InvalidFields(details),
            StoreError::Other(source) => ApiError::internal("Server error", source),
        }
    }
}

impl From<InvitationError> for ApiError {
    fn from(e: InvitationError) -> Self {
        match e {
            InvitationError::Validation(_)
            | InvitationError::MissingFields
            | InvitationError::InvalidOrExpiredToken
            | InvitationError::TokenExpired => ApiError::Validation(e.to_string()),
            InvitationError::Mail(source) => ApiError::internal("Error sending invitation", source),
            InvitationError::Store(source) => ApiError::internal("Error processing invitation", source),
            InvitationError::Hash(source) => ApiError::internal("Error setting password", source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_errors_split_401_and_403() {
        assert_eq!(ApiError::from(TokenError::Missing).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::from(TokenError::Invalid).status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::from(TokenError::Expired).status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::from(TokenError::Signing("no key".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn store_errors_map_to_taxonomy() {
        assert_eq!(ApiError::from(StoreError::NotFound).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::from(StoreError::Conflict("dup".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(StoreError::Other(anyhow::anyhow!("boom"))).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn malformed_body_is_a_400_with_json_message() {
        #[derive(Debug, serde::Deserialize)]
        struct Body {
            #[allow(dead_code)]
            role: crate::users::repo_types::Role,
        }

        let req = Request::builder()
            .method("POST")
            .uri("/")
            .header(axum::http::header::CONTENT_TYPE, "application/json")
            .body(axum::body::Body::from(r#"{"role":"superuser"}"#))
            .unwrap();
        let err = match AppJson::<Body>::from_request(req, &()).await {
            Err(e) => e,
            Ok(_) => panic!("unknown role must be rejected"),
        };
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("superuser"));
    }

    #[test]
    fn mail_failure_is_not_a_validation_error() {
        let err = ApiError::from(InvitationError::Mail(anyhow::anyhow!("smtp down")));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let err = ApiError::from(InvitationError::Validation("missing".into()));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
