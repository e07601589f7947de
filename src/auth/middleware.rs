//! Authentication and deadline middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::authenticator::RequestAuthenticator;
use crate::config::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::deadline::Deadline;

/// Reject requests that fail authentication, unless the path is open.
/// On success the [`super::VerifiedSession`] is stored in the request extensions.
pub async fn require_auth(
    State(auth): State<Arc<RequestAuthenticator>>,
    mut request: Request,
    next: Next,
) -> Response {
    if auth.is_open_route(request.uri().path()) {
        return next.run(request).await;
    }

    let deadline = request
        .extensions()
        .get::<Deadline>()
        .copied()
        .unwrap_or_else(|| Deadline::after(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)));

    match auth.authenticate(request.headers(), deadline).await {
        Ok(session) => {
            tracing::debug!(user_id = session.user_id, "request authenticated");
            request.extensions_mut().insert(session);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Attach a [`Deadline`] to the request and give up with 503 once it passes.
pub async fn stamp_deadline(
    State(timeout): State<Duration>,
    mut request: Request,
    next: Next,
) -> Response {
    let deadline = Deadline::after(timeout);
    request.extensions_mut().insert(deadline);

    match deadline.run(next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            tracing::warn!(timeout_secs = timeout.as_secs(), "request deadline exceeded");
            (StatusCode::SERVICE_UNAVAILABLE, "request timed out").into_response()
        }
    }
}
