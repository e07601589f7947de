use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

use super::AppState;
use super::error::json_body;
use crate::deadline::Deadline;
use crate::error::AuthError;
use crate::login::{Credentials, Registration};
use crate::validation::CheckInput;

/// `POST /login`: tokens in the body, session cookie in `Set-Cookie`.
pub async fn login(
    State(state): State<AppState>,
    deadline: Deadline,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<Response, AuthError> {
    let creds = json_body(payload)?;
    creds.check()?;

    let success = state.login.login(creds, deadline).await?;

    let cookie = state.cookies.set_cookie_header(&success.cookie);
    let cookie = HeaderValue::from_str(&cookie)
        .map_err(|e| AuthError::token_generation("session cookie is not a valid header", e))?;

    let mut response = (StatusCode::OK, Json(&success)).into_response();
    response.headers_mut().append(header::SET_COOKIE, cookie);
    Ok(response)
}

/// `POST /register`: the created record, without its password hash.
pub async fn register(
    State(state): State<AppState>,
    deadline: Deadline,
    payload: Result<Json<Registration>, JsonRejection>,
) -> Result<Response, AuthError> {
    let registration = json_body(payload)?;
    registration.check()?;

    let user = state.login.register(registration, deadline).await?;
    Ok((StatusCode::CREATED, Json(user)).into_response())
}
