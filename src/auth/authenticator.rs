use std::collections::HashSet;
use std::sync::Arc;

use axum::http::{HeaderMap, header};
use tracing::Instrument;

use crate::cache::{CredentialCache, cache_key};
use crate::db::UserStore;
use crate::deadline::Deadline;
use crate::error::AuthError;
use crate::jwt::TokenMinter;
use crate::session::SessionCookieCodec;

/// Identity attached to an authenticated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedSession {
    /// Access token id, agreed on by token, cookie and cache.
    pub jti: String,
    pub user_id: i64,
    pub email: String,
}

/// Checks token, session cookie and access binding against each other.
pub struct RequestAuthenticator {
    minter: Arc<TokenMinter>,
    cookies: Arc<SessionCookieCodec>,
    cache: Arc<dyn CredentialCache>,
    users: UserStore,
    open_routes: HashSet<String>,
    span: tracing::Span,
}

impl RequestAuthenticator {
    pub fn new(
        minter: Arc<TokenMinter>,
        cookies: Arc<SessionCookieCodec>,
        cache: Arc<dyn CredentialCache>,
        users: UserStore,
        open_routes: HashSet<String>,
    ) -> Self {
        Self {
            minter,
            cookies,
            cache,
            users,
            open_routes,
            span: tracing::info_span!("authenticator"),
        }
    }

    pub fn is_open_route(&self, path: &str) -> bool {
        self.open_routes.contains(path)
    }

    /// Run the full check. Any missing piece or disagreement is `Unauthorized`.
    pub async fn authenticate(
        &self,
        headers: &HeaderMap,
        deadline: Deadline,
    ) -> Result<VerifiedSession, AuthError> {
        self.check(headers, deadline)
            .instrument(self.span.clone())
            .await
    }

    async fn check(
        &self,
        headers: &HeaderMap,
        deadline: Deadline,
    ) -> Result<VerifiedSession, AuthError> {
        let token = bearer_token(headers).ok_or_else(|| deny("missing bearer token"))?;

        // Failures are logged by the minter according to their class.
        let claims = self
            .minter
            .verify_access(token)
            .map_err(|_| AuthError::Unauthorized)?;

        let session = self
            .cookies
            .read(headers)
            .ok_or_else(|| deny("missing or unreadable session cookie"))?;

        if session.access_jti != claims.jti {
            return Err(deny("session cookie does not match token"));
        }

        let user = match deadline.run(self.users.read_by_email(&session.email)).await {
            Ok(Ok(Some(user))) => user,
            Ok(Ok(None)) => return Err(deny("session user not found")),
            Ok(Err(e)) => {
                tracing::error!(error = %e, "user lookup failed");
                return Err(AuthError::Unauthorized);
            }
            Err(e) => {
                tracing::error!(error = %e, "user lookup timed out");
                return Err(AuthError::Unauthorized);
            }
        };

        if claims.sub != user.id.to_string() {
            return Err(deny("token subject does not match session user"));
        }

        let key = cache_key(&self.minter.settings().access_cache_key_id, user.id);
        match deadline.run(self.cache.get(&key)).await {
            Ok(Ok(Some(bound))) if bound == claims.jti => {}
            Ok(Ok(_)) => return Err(deny("access binding missing or superseded")),
            Ok(Err(e)) => {
                tracing::error!(error = %e, "access binding read failed");
                return Err(AuthError::Unauthorized);
            }
            Err(e) => {
                tracing::error!(error = %e, "access binding read timed out");
                return Err(AuthError::Unauthorized);
            }
        }

        Ok(VerifiedSession {
            jti: claims.jti,
            user_id: user.id,
            email: user.email,
        })
    }
}

fn deny(reason: &'static str) -> AuthError {
    tracing::warn!(reason, "request not authenticated");
    AuthError::Unauthorized
}

/// Token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
