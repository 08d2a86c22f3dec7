use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use utoipa::ToSchema;

use crate::store::StoreError;
use crate::templating::TemplateError;
use ocn_identity::{CredentialError, DidError};
use ocn_types::{InvalidAppSlug, InvalidAuthorityName};

/// The service-wide error taxonomy, mapped 1:1 to HTTP status classes.
#[derive(Debug, ToSchema)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    InternalServerError(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::InternalServerError(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

// Explicit conversions per error source. A blanket `From<E: Error>` would
// flatten NOT_FOUND and FORBIDDEN into 500s, so each source maps its own
// classes.

impl From<crate::auth::AuthError> for ApiError {
    fn from(err: crate::auth::AuthError) -> Self {
        use crate::auth::AuthError;
        match err {
            AuthError::MissingAuthHeader => ApiError::Unauthorized(err.to_string()),
            AuthError::InvalidTokenFormat => ApiError::BadRequest(err.to_string()),
            AuthError::ValidationFailed(_) => ApiError::Unauthorized(err.to_string()),
            AuthError::MissingScope(_) => ApiError::Forbidden(err.to_string()),
            AuthError::Internal(msg) => ApiError::InternalServerError(msg),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => ApiError::NotFound(msg),
            StoreError::Conflict(msg) => ApiError::BadRequest(msg),
            StoreError::AlreadyReceived(msg) => ApiError::BadRequest(msg),
            StoreError::Exhausted(msg) => ApiError::BadRequest(msg),
            StoreError::Internal(msg) => ApiError::InternalServerError(msg),
        }
    }
}

impl From<DidError> for ApiError {
    fn from(err: DidError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<CredentialError> for ApiError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::CryptoVerification(_) | CredentialError::MissingProof => {
                ApiError::Unauthorized(err.to_string())
            }
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

impl From<TemplateError> for ApiError {
    fn from(err: TemplateError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<InvalidAuthorityName> for ApiError {
    fn from(err: InvalidAuthorityName) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<InvalidAppSlug> for ApiError {
    fn from(err: InvalidAppSlug) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::BadRequest(format!("malformed JSON body: {}", err))
    }
}
