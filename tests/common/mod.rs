#![allow(dead_code)]

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode, header},
};
use tokensvc::cache::{CacheError, CredentialCache, MemoryCache};
use tokensvc::config::Settings;
use tokensvc::db::Database;
use tokensvc::keys::{KeyMaterial, KeyPairPem};
use tokensvc::password::CredentialVerifier;
use tokensvc::{ServerConfig, create_app};
use tower::ServiceExt;

pub const PASSWORD: &str = "Password123456";

/// RSA generation is slow; every test in a binary shares one pair.
static KEYS: OnceLock<Arc<KeyMaterial>> = OnceLock::new();

pub fn test_keys() -> Arc<KeyMaterial> {
    KEYS.get_or_init(|| {
        let pair = KeyPairPem::generate().expect("Failed to generate keys");
        Arc::new(pair.into_key_material().expect("Generated keys do not match"))
    })
    .clone()
}

/// Cheap Argon2 cost so registration and login stay fast.
pub fn test_params() -> argon2::Params {
    argon2::Params::new(1024, 1, 1, None).expect("Invalid params")
}

pub fn test_settings() -> Settings {
    Settings::with_cookie_keys(b"h".repeat(32), b"b".repeat(32))
}

pub struct TestApp {
    pub router: Router,
    pub cache: Arc<MemoryCache>,
    pub db: Database,
}

pub async fn create_test_app() -> TestApp {
    let cache = Arc::new(MemoryCache::new());
    let (router, db) = create_test_app_with(cache.clone(), test_settings()).await;
    TestApp { router, cache, db }
}

pub async fn create_test_app_with(
    cache: Arc<dyn CredentialCache>,
    settings: Settings,
) -> (Router, Database) {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let config = ServerConfig {
        settings,
        db: db.clone(),
        keys: test_keys(),
        cache,
        verifier: CredentialVerifier::with_params(test_params()).expect("Invalid params"),
    };
    let router = create_app(&config).expect("Failed to create app");
    (router, db)
}

/// Cache whose every call fails, as if the backend were unreachable.
pub struct FailingCache;

#[async_trait]
impl CredentialCache for FailingCache {
    async fn get(&self, _: &str) -> Result<Option<String>, CacheError> {
        Err(CacheError::Backend("connection refused".into()))
    }
    async fn set(&self, _: &str, _: &str, _: Duration) -> Result<(), CacheError> {
        Err(CacheError::Backend("connection refused".into()))
    }
    async fn incr(&self, _: &str, _: Duration) -> Result<i64, CacheError> {
        Err(CacheError::Backend("connection refused".into()))
    }
    async fn delete(&self, _: &str) -> Result<(), CacheError> {
        Err(CacheError::Backend("connection refused".into()))
    }
    async fn ping(&self) -> Result<(), CacheError> {
        Err(CacheError::Backend("connection refused".into()))
    }
}

pub async fn post_json(router: &Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

/// GET with optional bearer token and `Cookie` header.
pub async fn get_with(
    router: &Router,
    uri: &str,
    token: Option<&str>,
    cookie: Option<&str>,
) -> Response<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    router
        .clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// All `Set-Cookie` header values of a response.
pub fn extract_set_cookies<B>(response: &Response<B>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect()
}

pub async fn register(router: &Router, email: &str, password: &str) -> Response<Body> {
    post_json(
        router,
        "/register",
        serde_json::json!({
            "email": email,
            "password": password,
            "confirm_password": password,
        }),
    )
    .await
}

pub async fn login(router: &Router, email: &str, password: &str) -> Response<Body> {
    post_json(
        router,
        "/login",
        serde_json::json!({ "email": email, "password": password }),
    )
    .await
}

/// A completed login: both tokens plus the `name=value` cookie pair to send back.
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub cookie: String,
}

pub async fn register_and_login(router: &Router, email: &str) -> Session {
    let response = register(router, email, PASSWORD).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    login_session(router, email).await
}

pub async fn login_session(router: &Router, email: &str) -> Session {
    let response = login(router, email, PASSWORD).await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = extract_set_cookies(&response)
        .into_iter()
        .next()
        .expect("login sets a cookie");
    let cookie = cookie
        .split(';')
        .next()
        .expect("cookie has a name=value pair")
        .to_string();

    let json = body_json(response).await;
    Session {
        access_token: json["access_token"].as_str().unwrap().to_string(),
        refresh_token: json["refresh_token"].as_str().unwrap().to_string(),
        cookie,
    }
}

/// Claims of a JWT, read without checking the signature.
pub fn peek_claims(token: &str) -> serde_json::Value {
    use base64::Engine;
    let payload = token.split('.').nth(1).expect("token has a payload");
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .expect("payload is base64url");
    serde_json::from_slice(&bytes).expect("payload is json")
}
