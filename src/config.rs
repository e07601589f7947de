//! Runtime settings shared by every component.
//!
//! Built once at startup (see [`crate::cli::build_settings`]) and passed around
//! behind an `Arc`. Nothing here is mutated after construction.

use std::collections::HashSet;
use std::time::Duration;

/// Signed token settings.
#[derive(Debug, Clone)]
pub struct TokenSettings {
    /// `iss` claim written into and required from every token.
    pub issuer: String,
    pub access_lifespan: Duration,
    pub refresh_lifespan: Duration,
    /// Roles embedded in every access token.
    pub default_roles: Vec<String>,
    /// Prefix of the access binding cache key.
    pub access_cache_key_id: String,
}

/// Session cookie settings.
#[derive(Clone)]
pub struct CookieSettings {
    pub name: String,
    pub domain: String,
    pub lifespan_days: u16,
    /// Key for the MAC over the sealed value (32 bytes).
    pub hash_key: Vec<u8>,
    /// AES-256-GCM key (32 bytes).
    pub block_key: Vec<u8>,
}

impl CookieSettings {
    /// Cookie lifespan in seconds, as written to `Max-Age`.
    pub fn max_age_secs(&self) -> u64 {
        u64::from(self.lifespan_days) * 86_400
    }
}

impl std::fmt::Debug for CookieSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieSettings")
            .field("name", &self.name)
            .field("domain", &self.domain)
            .field("lifespan_days", &self.lifespan_days)
            .finish_non_exhaustive()
    }
}

/// Failed-login counting and account lock settings.
#[derive(Debug, Clone)]
pub struct LockoutSettings {
    pub failed_login_cache_key_id: String,
    pub failed_login_window: Duration,
    /// The lock is created once the failure count exceeds this value.
    pub failed_login_max: u32,
    pub account_locked_key_id: String,
    pub lock_duration: Duration,
}

/// HTTP surface settings.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    /// Paths that bypass request authentication.
    pub open_routes: HashSet<String>,
    /// Deadline applied to every request's cache and store calls.
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub token: TokenSettings,
    pub cookie: CookieSettings,
    pub lockout: LockoutSettings,
    pub api: ApiSettings,
}

pub const DEFAULT_ISSUER: &str = "homerow.tech";
pub const DEFAULT_ACCESS_TOKEN_MINS: u64 = 30;
pub const DEFAULT_REFRESH_TOKEN_MINS: u64 = 10_080;
pub const DEFAULT_FAILED_LOGIN_WINDOW_MINS: u64 = 30;
pub const DEFAULT_FAILED_LOGIN_MAX: u32 = 5;
pub const DEFAULT_ACCOUNT_LOCK_MINS: u64 = 60;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_OPEN_ROUTES: [&str; 3] = ["/login", "/register", "/health/ping"];

impl Settings {
    /// Settings with the service defaults and the given cookie keys.
    pub fn with_cookie_keys(hash_key: Vec<u8>, block_key: Vec<u8>) -> Self {
        Self {
            token: TokenSettings {
                issuer: DEFAULT_ISSUER.to_string(),
                access_lifespan: Duration::from_secs(DEFAULT_ACCESS_TOKEN_MINS * 60),
                refresh_lifespan: Duration::from_secs(DEFAULT_REFRESH_TOKEN_MINS * 60),
                default_roles: vec!["user".to_string()],
                access_cache_key_id: "token-access-user".to_string(),
            },
            cookie: CookieSettings {
                name: "homerow.tech".to_string(),
                domain: "dev.homerow.tech".to_string(),
                lifespan_days: 7,
                hash_key,
                block_key,
            },
            lockout: LockoutSettings {
                failed_login_cache_key_id: "failed-login-user".to_string(),
                failed_login_window: Duration::from_secs(DEFAULT_FAILED_LOGIN_WINDOW_MINS * 60),
                failed_login_max: DEFAULT_FAILED_LOGIN_MAX,
                account_locked_key_id: "account-locked-user".to_string(),
                lock_duration: Duration::from_secs(DEFAULT_ACCOUNT_LOCK_MINS * 60),
            },
            api: ApiSettings {
                open_routes: DEFAULT_OPEN_ROUTES.iter().map(|r| r.to_string()).collect(),
                request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            },
        }
    }
}
