mod auth;
mod error;
mod health;
mod users;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::auth::{RequestAuthenticator, require_auth, stamp_deadline};
use crate::cache::CredentialCache;
use crate::db::Database;
use crate::login::LoginOrchestrator;
use crate::session::SessionCookieCodec;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub login: Arc<LoginOrchestrator>,
    pub cookies: Arc<SessionCookieCodec>,
    pub db: Database,
    pub cache: Arc<dyn CredentialCache>,
    pub started_at: Instant,
}

/// Create the API router.
///
/// Every route gets a request deadline. Routes outside the open-route
/// allowlist additionally go through [`require_auth`].
pub fn create_api_router(
    state: AppState,
    authenticator: Arc<RequestAuthenticator>,
    request_timeout: Duration,
) -> Router {
    Router::new()
        .route("/login", post(auth::login))
        .route("/register", post(auth::register))
        .route("/users", get(users::list_users))
        .nest("/health", health::router())
        .with_state(state)
        .layer(middleware::from_fn_with_state(authenticator, require_auth))
        .layer(middleware::from_fn_with_state(
            request_timeout,
            stamp_deadline,
        ))
}
