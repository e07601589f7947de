//! Axum extractors for authenticated handlers.

use std::convert::Infallible;
use std::time::Duration;

use axum::{extract::FromRequestParts, http::request::Parts};

use super::authenticator::VerifiedSession;
use crate::config::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::deadline::Deadline;
use crate::error::AuthError;

/// Available on routes behind [`super::require_auth`].
impl<S> FromRequestParts<S> for VerifiedSession
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<VerifiedSession>()
            .cloned()
            .ok_or(AuthError::Unauthorized)
    }
}

/// The request's deadline, or a fresh default one outside the deadline layer.
impl<S> FromRequestParts<S> for Deadline
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Deadline>()
            .copied()
            .unwrap_or_else(|| Deadline::after(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))))
    }
}
