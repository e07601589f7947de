pub mod api;
pub mod audit;
pub mod auth;
pub mod cache;
pub mod cli;
pub mod config;
pub mod db;
pub mod deadline;
pub mod error;
pub mod jwt;
pub mod keys;
pub mod lockout;
pub mod login;
pub mod password;
pub mod session;
pub mod validation;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use api::{AppState, create_api_router};
use audit::Audit;
use auth::RequestAuthenticator;
use axum::Router;
use cache::CredentialCache;
use config::Settings;
use db::Database;
use jwt::TokenMinter;
use keys::KeyMaterial;
use lockout::Lockout;
use login::LoginOrchestrator;
use password::CredentialVerifier;
use session::{CookieError, SessionCookieCodec};
use tokio::net::TcpListener;

pub struct ServerConfig {
    pub settings: Settings,
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// RSA key pair used to sign and verify tokens
    pub keys: Arc<KeyMaterial>,
    /// Shared store for access bindings, failure counters and locks
    pub cache: Arc<dyn CredentialCache>,
    pub verifier: CredentialVerifier,
}

/// Create the application router with the given configuration.
///
/// Fails only if the cookie keys are not usable.
pub fn create_app(config: &ServerConfig) -> Result<Router, CookieError> {
    let settings = &config.settings;

    let minter = Arc::new(TokenMinter::new(
        config.keys.clone(),
        settings.token.clone(),
        Audit::new("token"),
    ));
    let cookies = Arc::new(SessionCookieCodec::new(&settings.cookie)?);

    let lockout = Lockout::new(
        config.cache.clone(),
        settings.lockout.clone(),
        Audit::new("lockout"),
    );
    let login = Arc::new(LoginOrchestrator::new(
        config.db.users(),
        config.verifier.clone(),
        lockout,
        config.cache.clone(),
        minter.clone(),
        cookies.clone(),
    ));

    let authenticator = Arc::new(RequestAuthenticator::new(
        minter,
        cookies.clone(),
        config.cache.clone(),
        config.db.users(),
        settings.api.open_routes.clone(),
    ));

    let state = AppState {
        login,
        cookies,
        db: config.db.clone(),
        cache: config.cache.clone(),
        started_at: Instant::now(),
    };

    Ok(create_api_router(
        state,
        authenticator,
        settings.api.request_timeout,
    ))
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config).map_err(std::io::Error::other)?;
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}
