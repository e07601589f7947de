mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use common::{
    PASSWORD, body_json, create_test_app, get_with, login_session, register, register_and_login,
};
use tokensvc::cache::CredentialCache;

fn cookie_value(pair: &str) -> &str {
    pair.split_once('=').unwrap().1
}

#[tokio::test]
async fn test_valid_session_lists_users() {
    let app = create_test_app().await;
    let session = register_and_login(&app.router, "bob@example.com").await;
    register(&app.router, "alice@example.com", PASSWORD).await;

    let response = get_with(
        &app.router,
        "/users",
        Some(&session.access_token),
        Some(&session.cookie),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let users = json.as_array().unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[0]["email"], "bob@example.com");
    assert_eq!(users[1]["email"], "alice@example.com");
    assert!(users.iter().all(|u| u.get("password_hash").is_none()));
}

#[tokio::test]
async fn test_missing_token_rejected() {
    let app = create_test_app().await;
    let session = register_and_login(&app.router, "bob@example.com").await;

    let response = get_with(&app.router, "/users", None, Some(&session.cookie)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "invalid auth");
}

#[tokio::test]
async fn test_missing_cookie_rejected() {
    let app = create_test_app().await;
    let session = register_and_login(&app.router, "bob@example.com").await;

    let response = get_with(&app.router, "/users", Some(&session.access_token), None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_lowercase_bearer_scheme_accepted() {
    let app = create_test_app().await;
    let session = register_and_login(&app.router, "bob@example.com").await;

    let response = tower::ServiceExt::oneshot(
        app.router.clone(),
        axum::http::Request::builder()
            .uri("/users")
            .header("authorization", format!("bearer {}", session.access_token))
            .header("cookie", &session.cookie)
            .body(axum::body::Body::empty())
            .unwrap(),
    )
    .await
    .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_token_is_not_an_access_token() {
    let app = create_test_app().await;
    let session = register_and_login(&app.router, "bob@example.com").await;

    let response = get_with(
        &app.router,
        "/users",
        Some(&session.refresh_token),
        Some(&session.cookie),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_second_login_invalidates_first() {
    let app = create_test_app().await;
    let first = register_and_login(&app.router, "bob@example.com").await;
    let second = login_session(&app.router, "bob@example.com").await;

    let response = get_with(
        &app.router,
        "/users",
        Some(&first.access_token),
        Some(&first.cookie),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = get_with(
        &app.router,
        "/users",
        Some(&second.access_token),
        Some(&second.cookie),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_token_and_cookie_from_different_logins_rejected() {
    let app = create_test_app().await;
    let first = register_and_login(&app.router, "bob@example.com").await;
    let second = login_session(&app.router, "bob@example.com").await;

    // Current token, stale cookie.
    let response = get_with(
        &app.router,
        "/users",
        Some(&second.access_token),
        Some(&first.cookie),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_cookie_of_another_user_rejected() {
    let app = create_test_app().await;
    let bob = register_and_login(&app.router, "bob@example.com").await;
    let alice = register_and_login(&app.router, "alice@example.com").await;

    let response = get_with(
        &app.router,
        "/users",
        Some(&bob.access_token),
        Some(&alice.cookie),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_tampered_cookie_rejected() {
    let app = create_test_app().await;
    let session = register_and_login(&app.router, "bob@example.com").await;

    let value = cookie_value(&session.cookie);
    let mut bytes = value.as_bytes().to_vec();
    let mid = bytes.len() / 2;
    bytes[mid] = if bytes[mid] == b'A' { b'B' } else { b'A' };
    let tampered = format!("homerow.tech={}", String::from_utf8(bytes).unwrap());

    let response = get_with(
        &app.router,
        "/users",
        Some(&session.access_token),
        Some(&tampered),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_tampered_token_rejected() {
    let app = create_test_app().await;
    let session = register_and_login(&app.router, "bob@example.com").await;

    let mut parts: Vec<String> = session
        .access_token
        .split('.')
        .map(str::to_string)
        .collect();
    let mut sig = parts[2].clone().into_bytes();
    let mid = sig.len() / 2;
    sig[mid] = if sig[mid] == b'A' { b'B' } else { b'A' };
    parts[2] = String::from_utf8(sig).unwrap();
    let tampered = parts.join(".");

    let response = get_with(&app.router, "/users", Some(&tampered), Some(&session.cookie)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_missing_binding_rejected() {
    let app = create_test_app().await;
    let session = register_and_login(&app.router, "bob@example.com").await;

    let user_id = common::peek_claims(&session.access_token)["sub"]
        .as_str()
        .unwrap()
        .to_string();
    app.cache
        .delete(&format!("token-access-user-{}", user_id))
        .await
        .unwrap();

    let response = get_with(
        &app.router,
        "/users",
        Some(&session.access_token),
        Some(&session.cookie),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_open_routes_skip_authentication() {
    let mut settings = common::test_settings();
    settings.api.open_routes.insert("/health/api".to_string());
    let (router, _db) =
        common::create_test_app_with(Arc::new(tokensvc::cache::MemoryCache::new()), settings)
            .await;

    let response = get_with(&router, "/health/api", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get_with(&router, "/users", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
