//! Shared error helpers for API handlers.

use axum::{Json, extract::rejection::JsonRejection};

use crate::deadline::Elapsed;
use crate::error::{AuthError, ValidationErrors};

/// Extension trait for concise error mapping on Results.
pub trait ResultExt<T> {
    fn store_err(self, msg: &str) -> Result<T, AuthError>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<Result<T, E>, Elapsed> {
    fn store_err(self, msg: &str) -> Result<T, AuthError> {
        match self {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(AuthError::internal(msg, e)),
            Err(e) => Err(AuthError::internal(msg, e)),
        }
    }
}

/// Unwrap a JSON body, reporting malformed input as a validation error.
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AuthError> {
    match payload {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => {
            let mut errors = ValidationErrors::default();
            errors.push("body", rejection.body_text());
            Err(AuthError::Validation(errors))
        }
    }
}
