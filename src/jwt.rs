//! JWT token minting and verification.
//!
//! Tokens are signed RS256 with the service's private key and verified with
//! its public key. Both kinds carry a `jti` so they can be tied to the login
//! that produced them. Verification failures are classified for auditing:
//! expiry is routine traffic, everything else points at a tampered token or a
//! misbehaving client.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Header, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audit::{Audit, AuditEvent};
use crate::config::TokenSettings;
use crate::keys::KeyMaterial;

/// Token type for distinguishing access vs refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Short-lived, presented as a bearer token on every request
    Access,
    /// Long-lived, used to obtain new access tokens
    Refresh,
}

/// JWT claims for access tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (numeric user id)
    pub sub: String,
    /// JWT ID, bound to the session cookie and the access binding
    pub jti: String,
    /// Issuer
    pub iss: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    pub roles: Vec<String>,
    /// Display name (the account email)
    pub name: String,
    #[serde(rename = "typ")]
    pub token_type: TokenType,
}

/// JWT claims for refresh tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub jti: String,
    pub iss: String,
    pub iat: u64,
    pub exp: u64,
    #[serde(rename = "typ")]
    pub token_type: TokenType,
}

trait TypedClaims: DeserializeOwned {
    const TOKEN_TYPE: TokenType;
}

impl TypedClaims for AccessClaims {
    const TOKEN_TYPE: TokenType = TokenType::Access;
}

impl TypedClaims for RefreshClaims {
    const TOKEN_TYPE: TokenType = TokenType::Refresh;
}

/// Extension claims carried only by access tokens.
#[derive(Debug, Clone, Default)]
pub struct AccessExtras {
    pub name: String,
    pub roles: Vec<String>,
}

/// What to mint.
#[derive(Debug, Clone, Copy)]
pub enum TokenKind<'a> {
    Access(&'a AccessExtras),
    Refresh,
}

/// A signed token and its identifying claims.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The JWT token string
    pub token: String,
    pub jti: String,
    pub issued_at: u64,
    pub expires_at: u64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("failed to sign token: {0}")]
    Signing(jsonwebtoken::errors::Error),
    #[error("system time error")]
    Time,
}

/// How a verification failure is treated for auditing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyFailure {
    /// Malformed token, bad signature, wrong algorithm or key problem.
    Tampered,
    /// Expired. Normal traffic.
    Expired,
    /// Bad issuer, not yet valid, wrong token type and similar claim failures.
    Rejected,
}

#[derive(Debug, Error)]
#[error("token rejected ({failure:?})")]
pub struct VerifyError {
    pub failure: VerifyFailure,
    #[source]
    pub source: Option<jsonwebtoken::errors::Error>,
}

/// Signs and verifies tokens with the service key pair.
pub struct TokenMinter {
    keys: Arc<KeyMaterial>,
    settings: TokenSettings,
    audit: Audit,
}

impl TokenMinter {
    pub fn new(keys: Arc<KeyMaterial>, settings: TokenSettings, audit: Audit) -> Self {
        Self {
            keys,
            settings,
            audit,
        }
    }

    pub fn settings(&self) -> &TokenSettings {
        &self.settings
    }

    /// Sign a token of the given kind for `subject` with the given `jti`.
    pub fn issue(
        &self,
        kind: TokenKind<'_>,
        subject: &str,
        jti: &str,
    ) -> Result<IssuedToken, TokenError> {
        let now = unix_now()?;
        let header = Header::new(Algorithm::RS256);

        let (token, exp) = match kind {
            TokenKind::Access(extras) => {
                let exp = now + self.settings.access_lifespan.as_secs();
                let claims = AccessClaims {
                    sub: subject.to_string(),
                    jti: jti.to_string(),
                    iss: self.settings.issuer.clone(),
                    iat: now,
                    exp,
                    roles: extras.roles.clone(),
                    name: extras.name.clone(),
                    token_type: TokenType::Access,
                };
                let token = jsonwebtoken::encode(&header, &claims, self.keys.encoding_key())
                    .map_err(TokenError::Signing)?;
                (token, exp)
            }
            TokenKind::Refresh => {
                let exp = now + self.settings.refresh_lifespan.as_secs();
                let claims = RefreshClaims {
                    sub: subject.to_string(),
                    jti: jti.to_string(),
                    iss: self.settings.issuer.clone(),
                    iat: now,
                    exp,
                    token_type: TokenType::Refresh,
                };
                let token = jsonwebtoken::encode(&header, &claims, self.keys.encoding_key())
                    .map_err(TokenError::Signing)?;
                (token, exp)
            }
        };

        Ok(IssuedToken {
            token,
            jti: jti.to_string(),
            issued_at: now,
            expires_at: exp,
        })
    }

    /// Verify an access token. Failures are logged according to their class.
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, VerifyError> {
        self.verify(token)
    }

    /// Verify a refresh token. Failures are logged according to their class.
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, VerifyError> {
        self.verify(token)
    }

    fn verify<T: TypedClaims>(&self, token: &str) -> Result<T, VerifyError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = 0;
        validation.set_issuer(&[self.settings.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        // Signature and registered claims are checked once; the typed claims
        // are read from the verified payload.
        let payload = match jsonwebtoken::decode::<serde_json::Value>(
            token,
            self.keys.decoding_key(),
            &validation,
        ) {
            Ok(data) => data.claims,
            Err(e) => {
                let failure = classify(e.kind());
                self.report(failure, &e);
                return Err(VerifyError {
                    failure,
                    source: Some(e),
                });
            }
        };

        let token_type = payload
            .get("typ")
            .and_then(|typ| TokenType::deserialize(typ).ok());
        if token_type != Some(T::TOKEN_TYPE) {
            return Err(self.reject(format!(
                "wrong token type {:?}, expected {:?}",
                token_type,
                T::TOKEN_TYPE
            )));
        }

        serde_json::from_value::<T>(payload)
            .map_err(|e| self.reject(format!("malformed {:?} claims: {}", T::TOKEN_TYPE, e)))
    }

    fn reject(&self, detail: String) -> VerifyError {
        self.audit.record(AuditEvent::JwtValidation, detail);
        VerifyError {
            failure: VerifyFailure::Rejected,
            source: None,
        }
    }

    fn report(&self, failure: VerifyFailure, err: &jsonwebtoken::errors::Error) {
        match failure {
            VerifyFailure::Expired => tracing::info!(error = %err, "expired token presented"),
            VerifyFailure::Tampered => self.audit.record(AuditEvent::JwtError, err),
            VerifyFailure::Rejected => self.audit.record(AuditEvent::JwtValidation, err),
        }
    }
}

/// Map a jsonwebtoken error onto the audit classes.
pub fn classify(kind: &ErrorKind) -> VerifyFailure {
    match kind {
        ErrorKind::ExpiredSignature => VerifyFailure::Expired,
        ErrorKind::InvalidIssuer
        | ErrorKind::InvalidAudience
        | ErrorKind::InvalidSubject
        | ErrorKind::ImmatureSignature
        | ErrorKind::MissingRequiredClaim(_) => VerifyFailure::Rejected,
        // Signature, algorithm, encoding and key failures.
        _ => VerifyFailure::Tampered,
    }
}

fn unix_now() -> Result<u64, TokenError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| TokenError::Time)
}
