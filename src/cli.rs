//! CLI argument parsing, validation, and startup helpers.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use crate::cache::{CredentialCache, MemoryCache, RedisCache};
use crate::config::{
    ApiSettings, CookieSettings, DEFAULT_ACCESS_TOKEN_MINS, DEFAULT_ACCOUNT_LOCK_MINS,
    DEFAULT_FAILED_LOGIN_MAX, DEFAULT_FAILED_LOGIN_WINDOW_MINS, DEFAULT_ISSUER, DEFAULT_OPEN_ROUTES,
    DEFAULT_REFRESH_TOKEN_MINS, DEFAULT_REQUEST_TIMEOUT_SECS, LockoutSettings, Settings,
    TokenSettings,
};
use crate::db::Database;
use crate::keys::{KeyMaterial, KeyPairPem};
use crate::session::KEY_LEN;

/// `--cache-url` value that selects the in-process cache.
pub const MEMORY_CACHE_URL: &str = "memory";

const HASH_KEY_ENV: &str = "COOKIE_HASH_KEY";
const BLOCK_KEY_ENV: &str = "COOKIE_BLOCK_KEY";

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Write a fresh RSA key pair (app.rsa, app.rsa.pub) into a directory
    Keygen {
        /// Output directory
        dir: PathBuf,
    },
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tokensvc",
    about = "Issues, binds and verifies session credentials"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Port to listen on
    #[arg(short, long, env = "TOKEN_SVC_PORT", default_value = "4000")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "TOKEN_SVC_DATABASE", default_value = "tokensvc.db")]
    pub database: String,

    /// Redis URL for the credential cache, or "memory" for an in-process cache
    #[arg(long, env = "TOKEN_SVC_CACHE_URL", default_value = "redis://127.0.0.1:6379")]
    pub cache_url: String,

    /// PEM file with the RSA private signing key
    #[arg(long, default_value = "/tmp/certs/app.rsa")]
    pub private_key: PathBuf,

    /// PEM file with the RSA public verification key
    #[arg(long, default_value = "/tmp/certs/app.rsa.pub")]
    pub public_key: PathBuf,

    /// Token issuer (`iss` claim)
    #[arg(long, default_value = DEFAULT_ISSUER)]
    pub issuer: String,

    #[arg(long, default_value_t = DEFAULT_ACCESS_TOKEN_MINS)]
    pub access_token_mins: u64,

    #[arg(long, default_value_t = DEFAULT_REFRESH_TOKEN_MINS)]
    pub refresh_token_mins: u64,

    /// Window in which failed logins are counted
    #[arg(long, default_value_t = DEFAULT_FAILED_LOGIN_WINDOW_MINS)]
    pub failed_login_window_mins: u64,

    /// Failed logins allowed before the account is locked
    #[arg(long, default_value_t = DEFAULT_FAILED_LOGIN_MAX)]
    pub failed_login_max: u32,

    #[arg(long, default_value_t = DEFAULT_ACCOUNT_LOCK_MINS)]
    pub account_lock_mins: u64,

    #[arg(long, default_value = "token-access-user")]
    pub access_cache_key_id: String,

    #[arg(long, default_value = "failed-login-user")]
    pub failed_login_cache_key_id: String,

    #[arg(long, default_value = "account-locked-user")]
    pub account_locked_key_id: String,

    #[arg(long, default_value = "homerow.tech")]
    pub cookie_name: String,

    #[arg(long, default_value = "dev.homerow.tech")]
    pub cookie_domain: String,

    #[arg(long, default_value_t = 7)]
    pub cookie_lifespan_days: u16,

    /// File with the cookie hash key and block key on separate lines.
    /// Prefer the COOKIE_HASH_KEY and COOKIE_BLOCK_KEY env vars instead
    #[arg(long)]
    pub cookie_key_file: Option<PathBuf>,

    /// Deadline for all cache and store calls made by one request
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    pub request_timeout_secs: u64,

    /// Path that skips authentication (repeatable)
    #[arg(long = "open-route", default_values = DEFAULT_OPEN_ROUTES)]
    pub open_routes: Vec<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Cookie hash and block keys.
pub struct CookieKeys {
    pub hash_key: Vec<u8>,
    pub block_key: Vec<u8>,
}

/// Load cookie keys from the environment or a key file.
/// Returns None and logs an error if the keys cannot be loaded.
pub fn load_cookie_keys(key_file: Option<&Path>) -> Option<CookieKeys> {
    let keys = match (std::env::var(HASH_KEY_ENV), std::env::var(BLOCK_KEY_ENV)) {
        (Ok(hash_key), Ok(block_key)) => {
            // Clear the environment variables to prevent leaking
            // SAFETY: We're single-threaded at this point during startup,
            // and no other code is reading these environment variables.
            unsafe {
                std::env::remove_var(HASH_KEY_ENV);
                std::env::remove_var(BLOCK_KEY_ENV);
            }
            CookieKeys {
                hash_key: hash_key.into_bytes(),
                block_key: block_key.into_bytes(),
            }
        }
        _ => match key_file {
            Some(path) => match std::fs::read_to_string(path) {
                Ok(content) => parse_key_file(&content)?,
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Failed to read cookie key file");
                    return None;
                }
            },
            None => {
                error!(
                    "Cookie keys are required. Set {} and {} (recommended) or use --cookie-key-file",
                    HASH_KEY_ENV, BLOCK_KEY_ENV
                );
                return None;
            }
        },
    };

    if keys.hash_key.len() != KEY_LEN || keys.block_key.len() != KEY_LEN {
        error!("Cookie keys must be exactly {} bytes each", KEY_LEN);
        return None;
    }

    Some(keys)
}

fn parse_key_file(content: &str) -> Option<CookieKeys> {
    let mut lines = content.lines().map(str::trim).filter(|l| !l.is_empty());
    match (lines.next(), lines.next()) {
        (Some(hash_key), Some(block_key)) => Some(CookieKeys {
            hash_key: hash_key.as_bytes().to_vec(),
            block_key: block_key.as_bytes().to_vec(),
        }),
        _ => {
            error!("Cookie key file must contain the hash key and block key on separate lines");
            None
        }
    }
}

/// Load and check the signing key pair.
pub fn load_keys(private_key: &Path, public_key: &Path) -> Option<Arc<KeyMaterial>> {
    match KeyMaterial::load(private_key, public_key) {
        Ok(keys) => {
            info!(private_key = %private_key.display(), "Signing keys loaded");
            Some(Arc::new(keys))
        }
        Err(e) => {
            error!(error = %e, "Failed to load signing keys");
            None
        }
    }
}

/// Generate a key pair into `dir`. Returns false and logs if that fails.
pub fn run_keygen(dir: &Path) -> bool {
    let written = KeyPairPem::generate().and_then(|pair| pair.write_to(dir));
    match written {
        Ok((private_path, public_path)) => {
            println!("Private key: {}", private_path.display());
            println!("Public key:  {}", public_path.display());
            true
        }
        Err(e) => {
            error!(dir = %dir.display(), error = %e, "Failed to generate keys");
            false
        }
    }
}

/// Connect to the credential cache, logging errors if it fails.
pub async fn connect_cache(url: &str) -> Option<Arc<dyn CredentialCache>> {
    if url == MEMORY_CACHE_URL {
        warn!("Using in-process credential cache, state is lost on restart");
        return Some(Arc::new(MemoryCache::new()));
    }

    match RedisCache::connect(url).await {
        Ok(cache) => {
            info!("Credential cache connected");
            Some(Arc::new(cache))
        }
        Err(e) => {
            error!(error = %e, "Failed to connect to credential cache");
            None
        }
    }
}

/// Build Settings from validated arguments.
pub fn build_settings(args: &Args, keys: CookieKeys) -> Settings {
    Settings {
        token: TokenSettings {
            issuer: args.issuer.clone(),
            access_lifespan: Duration::from_secs(args.access_token_mins * 60),
            refresh_lifespan: Duration::from_secs(args.refresh_token_mins * 60),
            default_roles: vec!["user".to_string()],
            access_cache_key_id: args.access_cache_key_id.clone(),
        },
        cookie: CookieSettings {
            name: args.cookie_name.clone(),
            domain: args.cookie_domain.clone(),
            lifespan_days: args.cookie_lifespan_days,
            hash_key: keys.hash_key,
            block_key: keys.block_key,
        },
        lockout: LockoutSettings {
            failed_login_cache_key_id: args.failed_login_cache_key_id.clone(),
            failed_login_window: Duration::from_secs(args.failed_login_window_mins * 60),
            failed_login_max: args.failed_login_max,
            account_locked_key_id: args.account_locked_key_id.clone(),
            lock_duration: Duration::from_secs(args.account_lock_mins * 60),
        },
        api: ApiSettings {
            open_routes: args.open_routes.iter().cloned().collect::<HashSet<_>>(),
            request_timeout: Duration::from_secs(args.request_timeout_secs),
        },
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
