//! Sealed session cookie.
//!
//! The attribute map is serialized to JSON, encrypted with AES-256-GCM (cookie
//! name as associated data) and timestamped. The timestamped body is then
//! authenticated with HMAC-SHA256 under a separate key. Wire value:
//!
//! ```text
//! base64url( timestamp "|" base64url(nonce || ciphertext) "|" base64url(mac) )
//! ```
//!
//! Anything that fails to decode, authenticate, decrypt or is past its max age
//! reads as "no cookie".

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use axum::http::{HeaderMap, header};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;

use crate::config::CookieSettings;

type HmacSha256 = Hmac<Sha256>;

/// Browsers drop cookies larger than this.
pub const MAX_COOKIE_LEN: usize = 4096;

pub const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

pub const ATTR_USER_ID: &str = "id";
pub const ATTR_EMAIL: &str = "email";
pub const ATTR_ACCESS_JTI: &str = "jti-access";
pub const ATTR_REFRESH_JTI: &str = "jti-refresh";

pub type Attributes = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum CookieError {
    #[error("cookie keys must be {KEY_LEN} bytes each")]
    InvalidKey,
    #[error("failed to serialize cookie attributes: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to seal cookie")]
    Seal,
    #[error("sealed cookie is {0} bytes, limit is {MAX_COOKIE_LEN}")]
    TooLong(usize),
    #[error("system time error")]
    Time,
}

/// The attributes written at login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub user_id: i64,
    pub email: String,
    pub access_jti: String,
    pub refresh_jti: String,
}

impl SessionCookie {
    pub fn to_attributes(&self) -> Attributes {
        let mut attrs = Attributes::new();
        attrs.insert(ATTR_USER_ID.to_string(), self.user_id.to_string());
        attrs.insert(ATTR_EMAIL.to_string(), self.email.clone());
        attrs.insert(ATTR_ACCESS_JTI.to_string(), self.access_jti.clone());
        attrs.insert(ATTR_REFRESH_JTI.to_string(), self.refresh_jti.clone());
        attrs
    }

    /// `None` if any attribute is missing or the id is not numeric.
    pub fn from_attributes(attrs: &Attributes) -> Option<Self> {
        Some(Self {
            user_id: attrs.get(ATTR_USER_ID)?.parse().ok()?,
            email: attrs.get(ATTR_EMAIL)?.clone(),
            access_jti: attrs.get(ATTR_ACCESS_JTI)?.clone(),
            refresh_jti: attrs.get(ATTR_REFRESH_JTI)?.clone(),
        })
    }
}

/// Seals and opens session cookies.
pub struct SessionCookieCodec {
    name: String,
    domain: String,
    max_age: u64,
    mac_key: Vec<u8>,
    cipher: Aes256Gcm,
}

impl SessionCookieCodec {
    pub fn new(settings: &CookieSettings) -> Result<Self, CookieError> {
        if settings.hash_key.len() != KEY_LEN {
            return Err(CookieError::InvalidKey);
        }
        let cipher =
            Aes256Gcm::new_from_slice(&settings.block_key).map_err(|_| CookieError::InvalidKey)?;
        Ok(Self {
            name: settings.name.clone(),
            domain: settings.domain.clone(),
            max_age: settings.max_age_secs(),
            mac_key: settings.hash_key.clone(),
            cipher,
        })
    }

    /// Seal an attribute map into a cookie value.
    pub fn encode(&self, attrs: &Attributes) -> Result<String, CookieError> {
        self.encode_at(attrs, unix_now().ok_or(CookieError::Time)?)
    }

    fn encode_at(&self, attrs: &Attributes, timestamp: u64) -> Result<String, CookieError> {
        let plaintext = serde_json::to_vec(attrs)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: &plaintext,
                    aad: self.name.as_bytes(),
                },
            )
            .map_err(|_| CookieError::Seal)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);

        let body = format!("{}|{}", timestamp, URL_SAFE_NO_PAD.encode(&sealed));
        let tag = self.mac(&body)?.finalize().into_bytes();
        let value = URL_SAFE_NO_PAD.encode(format!("{}|{}", body, URL_SAFE_NO_PAD.encode(tag)));

        if value.len() > MAX_COOKIE_LEN {
            return Err(CookieError::TooLong(value.len()));
        }
        Ok(value)
    }

    /// Open a cookie value. `None` for anything not sealed by this codec or expired.
    pub fn decode(&self, value: &str) -> Option<Attributes> {
        if value.is_empty() || value.len() > MAX_COOKIE_LEN {
            return None;
        }
        let raw = URL_SAFE_NO_PAD.decode(value).ok()?;
        let raw = String::from_utf8(raw).ok()?;

        let (body, tag) = raw.rsplit_once('|')?;
        let tag = URL_SAFE_NO_PAD.decode(tag).ok()?;
        self.mac(body).ok()?.verify_slice(&tag).ok()?;

        let (timestamp, sealed) = body.split_once('|')?;
        let timestamp: u64 = timestamp.parse().ok()?;
        if unix_now()? > timestamp.saturating_add(self.max_age) {
            return None;
        }

        let sealed = URL_SAFE_NO_PAD.decode(sealed).ok()?;
        if sealed.len() < NONCE_LEN {
            return None;
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: self.name.as_bytes(),
                },
            )
            .ok()?;

        serde_json::from_slice(&plaintext).ok()
    }

    pub fn seal(&self, cookie: &SessionCookie) -> Result<String, CookieError> {
        self.encode(&cookie.to_attributes())
    }

    pub fn open(&self, value: &str) -> Option<SessionCookie> {
        SessionCookie::from_attributes(&self.decode(value)?)
    }

    /// Read and open this codec's cookie from request headers.
    pub fn read(&self, headers: &HeaderMap) -> Option<SessionCookie> {
        self.open(get_cookie(headers, &self.name)?)
    }

    /// `Set-Cookie` header value for a sealed cookie.
    pub fn set_cookie_header(&self, value: &str) -> String {
        format!(
            "{}={}; Domain={}; Path=/; Max-Age={}; HttpOnly; Secure",
            self.name, value, self.domain, self.max_age
        )
    }

    fn mac(&self, body: &str) -> Result<HmacSha256, CookieError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.mac_key)
            .map_err(|_| CookieError::InvalidKey)?;
        mac.update(self.name.as_bytes());
        mac.update(b"|");
        mac.update(body.as_bytes());
        Ok(mac)
    }
}

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                return Some(value.trim());
            }
        }
    }
    None
}

fn unix_now() -> Option<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs())
}
