//! Error taxonomy shared by the login, registration and request pipelines.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Field-level input problems reported by [`crate::validation::CheckInput`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    pub fields: Vec<FieldError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationErrors {
    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.fields.push(FieldError {
            field,
            message: message.into(),
        });
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account locked")]
    AccountLocked,
    /// The attempt that created the account lock.
    #[error("login attempts exceeded")]
    LoginAttemptsExceeded,
    #[error("invalid auth")]
    Unauthorized,
    #[error("token generation failed: {0}")]
    TokenGeneration(String),
    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),
    #[error("not found")]
    NotFound,
    #[error("conflict")]
    Conflict,
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn token_generation(context: &str, e: impl std::fmt::Display) -> Self {
        tracing::error!("{}: {}", context, e);
        Self::TokenGeneration(context.into())
    }

    pub fn internal(context: &str, e: impl std::fmt::Display) -> Self {
        tracing::error!("{}: {}", context, e);
        Self::Internal(context.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::InvalidCredentials | AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
            AuthError::AccountLocked | AuthError::LoginAttemptsExceeded => StatusCode::FORBIDDEN,
            AuthError::NotFound => StatusCode::NOT_FOUND,
            AuthError::Conflict => StatusCode::CONFLICT,
            AuthError::TokenGeneration(_) | AuthError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AuthError::CacheUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Message shown to the client. Infrastructure detail stays in the logs.
    fn public_message(&self) -> &'static str {
        match self {
            AuthError::Validation(_) => "invalid request",
            AuthError::InvalidCredentials => "invalid credentials",
            AuthError::AccountLocked | AuthError::LoginAttemptsExceeded => "account locked",
            AuthError::Unauthorized => "invalid auth",
            AuthError::NotFound => "not found",
            AuthError::Conflict => "already exists",
            AuthError::TokenGeneration(_) | AuthError::Internal(_) => "internal server error",
            AuthError::CacheUnavailable(_) => "service unavailable",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<Vec<FieldError>>,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error = self.public_message();
        let fields = match self {
            AuthError::Validation(errors) => Some(errors.fields),
            _ => None,
        };
        (status, Json(ErrorResponse { error, fields })).into_response()
    }
}
