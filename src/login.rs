//! Login and registration.
//!
//! Login runs as a fixed sequence: lock check, credential check, concurrent
//! generation of both tokens and the session cookie, then the access binding
//! write. Nothing generated is returned unless every step succeeds.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::Instrument;
use validator::Validate;

use crate::cache::{CredentialCache, cache_key};
use crate::db::{UserRecord, UserStore, is_unique_violation};
use crate::deadline::Deadline;
use crate::error::AuthError;
use crate::jwt::{AccessExtras, IssuedToken, TokenKind, TokenMinter};
use crate::lockout::{FailureOutcome, Lockout};
use crate::password::CredentialVerifier;
use crate::session::{SessionCookie, SessionCookieCodec};
use crate::validation::{PASSWORD_MAX_LEN, PASSWORD_MIN_LEN};

/// Login input. Only presence and email shape are checked; password rules
/// apply at registration.
#[derive(Clone, Deserialize, Validate)]
pub struct Credentials {
    #[validate(email(message = "is not a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "is required"))]
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Registration input.
#[derive(Clone, Deserialize, Validate)]
pub struct Registration {
    #[validate(email(message = "is not a valid email address"))]
    pub email: String,
    #[validate(length(min = PASSWORD_MIN_LEN, max = PASSWORD_MAX_LEN, message = "must be 12 to 50 characters"))]
    pub password: String,
    #[validate(
        length(min = PASSWORD_MIN_LEN, max = PASSWORD_MAX_LEN, message = "must be 12 to 50 characters"),
        must_match(other = "password", message = "must match password")
    )]
    pub confirm_password: String,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Everything a successful login hands back.
#[derive(Debug, Clone, Serialize)]
pub struct LoginSuccess {
    pub access_token: String,
    pub refresh_token: String,
    /// Sealed session cookie value.
    #[serde(skip)]
    pub cookie: String,
    #[serde(skip)]
    pub user_id: i64,
    #[serde(skip)]
    pub access_jti: String,
    #[serde(skip)]
    pub refresh_jti: String,
}

pub struct LoginOrchestrator {
    users: UserStore,
    verifier: CredentialVerifier,
    lockout: Lockout,
    cache: Arc<dyn CredentialCache>,
    minter: Arc<TokenMinter>,
    cookies: Arc<SessionCookieCodec>,
    span: tracing::Span,
}

impl LoginOrchestrator {
    pub fn new(
        users: UserStore,
        verifier: CredentialVerifier,
        lockout: Lockout,
        cache: Arc<dyn CredentialCache>,
        minter: Arc<TokenMinter>,
        cookies: Arc<SessionCookieCodec>,
    ) -> Self {
        Self {
            users,
            verifier,
            lockout,
            cache,
            minter,
            cookies,
            span: tracing::info_span!("login"),
        }
    }

    pub async fn login(
        &self,
        creds: Credentials,
        deadline: Deadline,
    ) -> Result<LoginSuccess, AuthError> {
        let span = self.span.clone();
        async move {
            let email = creds.email.clone();

            if self.lockout.is_locked(&email, deadline).await {
                tracing::warn!(email = %email, "login rejected, account locked");
                return Err(AuthError::AccountLocked);
            }

            let user = self.check_credentials(creds, deadline).await?;
            let success = self.issue(&user, deadline).await?;

            self.lockout.clear(&email, deadline).await;
            tracing::info!(email = %email, user_id = user.id, "login succeeded");
            Ok(success)
        }
        .instrument(span)
        .await
    }

    /// Look up the account and compare the password. Every failure is
    /// `InvalidCredentials`; only genuine mismatches are counted.
    async fn check_credentials(
        &self,
        creds: Credentials,
        deadline: Deadline,
    ) -> Result<UserRecord, AuthError> {
        let user = match deadline.run(self.users.read_by_email(&creds.email)).await {
            Ok(Ok(user)) => user,
            Ok(Err(e)) => {
                tracing::error!(email = %creds.email, error = %e, "user lookup failed");
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => {
                tracing::error!(email = %creds.email, error = %e, "user lookup timed out");
                return Err(AuthError::InvalidCredentials);
            }
        };

        let stored_hash = user.as_ref().map(|u| u.password_hash.clone());
        let matched = self.verifier.verify(creds.password, stored_hash).await;

        match user {
            Some(user) if matched => Ok(user),
            _ => match self.lockout.record_failure(&creds.email, deadline).await {
                FailureOutcome::JustLocked => Err(AuthError::LoginAttemptsExceeded),
                FailureOutcome::Counted(_) | FailureOutcome::Unrecorded => {
                    Err(AuthError::InvalidCredentials)
                }
            },
        }
    }

    /// Mint both tokens and seal the cookie concurrently, then bind the
    /// access token to the user.
    ///
    /// If this future is dropped, the join is abandoned and nothing is bound.
    /// Blocking units that already started are detached, not aborted; they
    /// finish on the blocking pool and their output is discarded.
    async fn issue(&self, user: &UserRecord, deadline: Deadline) -> Result<LoginSuccess, AuthError> {
        let access_jti = uuid::Uuid::new_v4().to_string();
        let refresh_jti = uuid::Uuid::new_v4().to_string();
        let subject = user.id.to_string();

        let access = {
            let minter = self.minter.clone();
            let subject = subject.clone();
            let jti = access_jti.clone();
            let extras = AccessExtras {
                name: user.email.clone(),
                roles: self.minter.settings().default_roles.clone(),
            };
            async move {
                tokio::task::spawn_blocking(move || {
                    minter.issue(TokenKind::Access(&extras), &subject, &jti)
                })
                .await
                .map_err(|e| AuthError::token_generation("access token task failed", e))?
                .map_err(|e| AuthError::token_generation("failed to sign access token", e))
            }
        };

        let refresh = {
            let minter = self.minter.clone();
            let jti = refresh_jti.clone();
            async move {
                tokio::task::spawn_blocking(move || minter.issue(TokenKind::Refresh, &subject, &jti))
                    .await
                    .map_err(|e| AuthError::token_generation("refresh token task failed", e))?
                    .map_err(|e| AuthError::token_generation("failed to sign refresh token", e))
            }
        };

        let cookie = {
            let cookies = self.cookies.clone();
            let session = SessionCookie {
                user_id: user.id,
                email: user.email.clone(),
                access_jti: access_jti.clone(),
                refresh_jti: refresh_jti.clone(),
            };
            async move {
                tokio::task::spawn_blocking(move || cookies.seal(&session))
                    .await
                    .map_err(|e| AuthError::token_generation("cookie task failed", e))?
                    .map_err(|e| AuthError::token_generation("failed to seal cookie", e))
            }
        };

        let (access, refresh, cookie): (IssuedToken, IssuedToken, String) =
            tokio::try_join!(access, refresh, cookie)?;

        let binding_key = cache_key(&self.minter.settings().access_cache_key_id, user.id);
        let ttl = self.minter.settings().access_lifespan;
        match deadline
            .run(self.cache.set(&binding_key, &access_jti, ttl))
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(AuthError::token_generation("failed to write access binding", e)),
            Err(e) => return Err(AuthError::token_generation("failed to write access binding", e)),
        }

        Ok(LoginSuccess {
            access_token: access.token,
            refresh_token: refresh.token,
            cookie,
            user_id: user.id,
            access_jti,
            refresh_jti,
        })
    }

    /// Create an account. The returned record carries the hash but never
    /// serializes it.
    pub async fn register(
        &self,
        registration: Registration,
        deadline: Deadline,
    ) -> Result<UserRecord, AuthError> {
        let span = self.span.clone();
        async move {
            let hash = self
                .verifier
                .hash(registration.password)
                .await
                .map_err(|e| AuthError::internal("failed to hash password", e))?;

            match deadline
                .run(self.users.insert(&registration.email, &hash))
                .await
            {
                Ok(Ok(user)) => {
                    tracing::info!(email = %user.email, user_id = user.id, "user registered");
                    Ok(user)
                }
                Ok(Err(e)) if is_unique_violation(&e) => {
                    tracing::warn!(email = %registration.email, "registration for existing email");
                    Err(AuthError::Conflict)
                }
                Ok(Err(e)) => Err(AuthError::internal("failed to insert user", e)),
                Err(e) => Err(AuthError::internal("user insert timed out", e)),
            }
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::Audit;
    use crate::cache::{CacheError, MemoryCache};
    use crate::config::Settings;
    use crate::db::Database;
    use crate::keys::{KeyMaterial, KeyPairPem};
    use crate::password::test_params;
    use async_trait::async_trait;
    use std::sync::OnceLock;
    use std::time::Duration;

    fn keys() -> Arc<KeyMaterial> {
        static KEYS: OnceLock<Arc<KeyMaterial>> = OnceLock::new();
        KEYS.get_or_init(|| Arc::new(KeyPairPem::generate().unwrap().into_key_material().unwrap()))
            .clone()
    }

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(10))
    }

    /// Reads succeed against an inner cache, writes to keys with `prefix` fail.
    struct BrokenWrites {
        inner: MemoryCache,
        prefix: &'static str,
    }

    #[async_trait]
    impl CredentialCache for BrokenWrites {
        async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
            self.inner.get(key).await
        }
        async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
            if key.starts_with(self.prefix) {
                return Err(CacheError::Backend("write refused".into()));
            }
            self.inner.set(key, value, ttl).await
        }
        async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, CacheError> {
            self.inner.incr(key, ttl).await
        }
        async fn delete(&self, key: &str) -> Result<(), CacheError> {
            self.inner.delete(key).await
        }
        async fn ping(&self) -> Result<(), CacheError> {
            Ok(())
        }
    }

    async fn orchestrator(
        cache: Arc<dyn CredentialCache>,
    ) -> (LoginOrchestrator, Arc<TokenMinter>, Arc<SessionCookieCodec>) {
        let settings = Settings::with_cookie_keys(vec![3u8; 32], vec![4u8; 32]);
        let db = Database::open(":memory:").await.unwrap();
        let minter = Arc::new(TokenMinter::new(keys(), settings.token.clone(), Audit::new("jwt")));
        let cookies = Arc::new(SessionCookieCodec::new(&settings.cookie).unwrap());
        let lockout = Lockout::new(cache.clone(), settings.lockout.clone(), Audit::new("lockout"));
        let orchestrator = LoginOrchestrator::new(
            db.users(),
            CredentialVerifier::with_params(test_params()).unwrap(),
            lockout,
            cache,
            minter.clone(),
            cookies.clone(),
        );
        (orchestrator, minter, cookies)
    }

    fn registration() -> Registration {
        Registration {
            email: "bob@example.com".to_string(),
            password: "Password123456".to_string(),
            confirm_password: "Password123456".to_string(),
        }
    }

    fn creds(password: &str) -> Credentials {
        Credentials {
            email: "bob@example.com".to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_login_returns_consistent_bundle() {
        let cache = Arc::new(MemoryCache::new());
        let (svc, minter, cookies) = orchestrator(cache.clone()).await;
        let user = svc.register(registration(), deadline()).await.unwrap();

        let success = svc.login(creds("Password123456"), deadline()).await.unwrap();

        let access = minter.verify_access(&success.access_token).unwrap();
        let refresh = minter.verify_refresh(&success.refresh_token).unwrap();
        let session = cookies.open(&success.cookie).unwrap();

        assert_eq!(access.jti, success.access_jti);
        assert_eq!(refresh.jti, success.refresh_jti);
        assert_eq!(session.access_jti, access.jti);
        assert_eq!(session.refresh_jti, refresh.jti);
        assert_eq!(session.user_id, user.id);
        assert_eq!(session.email, "bob@example.com");
        assert_eq!(access.sub, user.id.to_string());
        assert_eq!(access.name, "bob@example.com");

        let binding = cache
            .get(&format!("token-access-user-{}", user.id))
            .await
            .unwrap();
        assert_eq!(binding, Some(access.jti));
    }

    #[tokio::test]
    async fn test_second_login_overwrites_binding() {
        let cache = Arc::new(MemoryCache::new());
        let (svc, _, _) = orchestrator(cache.clone()).await;
        let user = svc.register(registration(), deadline()).await.unwrap();

        let first = svc.login(creds("Password123456"), deadline()).await.unwrap();
        let second = svc.login(creds("Password123456"), deadline()).await.unwrap();
        assert_ne!(first.access_jti, second.access_jti);

        let binding = cache
            .get(&format!("token-access-user-{}", user.id))
            .await
            .unwrap();
        assert_eq!(binding, Some(second.access_jti));
    }

    #[tokio::test]
    async fn test_unknown_email_and_wrong_password_look_alike() {
        let (svc, _, _) = orchestrator(Arc::new(MemoryCache::new())).await;
        svc.register(registration(), deadline()).await.unwrap();

        let wrong = svc.login(creds("WrongPassword1"), deadline()).await.unwrap_err();
        let unknown = svc
            .login(
                Credentials {
                    email: "nobody@example.com".to_string(),
                    password: "Password123456".to_string(),
                },
                deadline(),
            )
            .await
            .unwrap_err();

        assert!(matches!(wrong, AuthError::InvalidCredentials));
        assert!(matches!(unknown, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_lockout_sequence() {
        let (svc, _, _) = orchestrator(Arc::new(MemoryCache::new())).await;
        svc.register(registration(), deadline()).await.unwrap();

        for _ in 0..5 {
            assert!(matches!(
                svc.login(creds("WrongPassword1"), deadline()).await,
                Err(AuthError::InvalidCredentials)
            ));
        }
        assert!(matches!(
            svc.login(creds("WrongPassword1"), deadline()).await,
            Err(AuthError::LoginAttemptsExceeded)
        ));
        assert!(matches!(
            svc.login(creds("Password123456"), deadline()).await,
            Err(AuthError::AccountLocked)
        ));
    }

    #[tokio::test]
    async fn test_success_clears_failure_count() {
        let (svc, _, _) = orchestrator(Arc::new(MemoryCache::new())).await;
        svc.register(registration(), deadline()).await.unwrap();

        for _ in 0..4 {
            svc.login(creds("WrongPassword1"), deadline()).await.unwrap_err();
        }
        svc.login(creds("Password123456"), deadline()).await.unwrap();
        for _ in 0..5 {
            assert!(matches!(
                svc.login(creds("WrongPassword1"), deadline()).await,
                Err(AuthError::InvalidCredentials)
            ));
        }
    }

    #[tokio::test]
    async fn test_binding_write_failure_fails_login() {
        let cache = Arc::new(BrokenWrites {
            inner: MemoryCache::new(),
            prefix: "token-access-user",
        });
        let (svc, _, _) = orchestrator(cache).await;
        svc.register(registration(), deadline()).await.unwrap();

        assert!(matches!(
            svc.login(creds("Password123456"), deadline()).await,
            Err(AuthError::TokenGeneration(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_generation_unit_fails_login_without_binding() {
        let cache = Arc::new(MemoryCache::new());
        let (svc, _, _) = orchestrator(cache.clone()).await;

        // The email is sealed into the cookie, which then exceeds the size limit.
        let email = format!("{}@example.com", "b".repeat(crate::session::MAX_COOKIE_LEN));
        let user = svc
            .register(
                Registration {
                    email: email.clone(),
                    ..registration()
                },
                deadline(),
            )
            .await
            .unwrap();

        let result = svc
            .login(
                Credentials {
                    email,
                    password: "Password123456".to_string(),
                },
                deadline(),
            )
            .await;
        assert!(matches!(result, Err(AuthError::TokenGeneration(_))));

        let binding = cache
            .get(&format!("token-access-user-{}", user.id))
            .await
            .unwrap();
        assert_eq!(binding, None);
    }

    #[tokio::test]
    async fn test_duplicate_registration_conflicts() {
        let (svc, _, _) = orchestrator(Arc::new(MemoryCache::new())).await;
        svc.register(registration(), deadline()).await.unwrap();
        assert!(matches!(
            svc.register(registration(), deadline()).await,
            Err(AuthError::Conflict)
        ));
    }

    #[tokio::test]
    async fn test_debug_hides_password() {
        let debug = format!("{:?} {:?}", creds("Password123456"), registration());
        assert!(!debug.contains("Password123456"));
    }
}
