//! Password hashing and verification (Argon2id).
//!
//! Hashing is CPU-bound and runs on the blocking pool so it never stalls the
//! async workers.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("password hashing failed: {0}")]
    Hash(argon2::password_hash::Error),
    #[error("hashing task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Compares plaintext passwords against stored hashes.
///
/// Holds a dummy hash so a lookup for an unknown account costs the same as a
/// wrong password.
#[derive(Clone)]
pub struct CredentialVerifier {
    params: Params,
    dummy_hash: String,
}

impl CredentialVerifier {
    /// Verifier with the Argon2id default cost.
    pub fn new() -> Result<Self, PasswordError> {
        Self::with_params(Params::default())
    }

    pub fn with_params(params: Params) -> Result<Self, PasswordError> {
        let mut dummy = [0u8; 32];
        rand::rng().fill_bytes(&mut dummy);
        let dummy_hash = hash_with(&params, &base64_secret(&dummy))?;
        Ok(Self { params, dummy_hash })
    }

    /// Hash a new password on the blocking pool.
    pub async fn hash(&self, password: String) -> Result<String, PasswordError> {
        let params = self.params.clone();
        tokio::task::spawn_blocking(move || hash_with(&params, &password)).await?
    }

    /// Compare `password` against `stored_hash`, or against the dummy hash when
    /// no account was found. Any failure counts as a mismatch.
    pub async fn verify(&self, password: String, stored_hash: Option<String>) -> bool {
        let known = stored_hash.is_some();
        let hash = stored_hash.unwrap_or_else(|| self.dummy_hash.clone());
        let matched = tokio::task::spawn_blocking(move || verify_hash(&password, &hash))
            .await
            .unwrap_or(false);
        known && matched
    }
}

fn argon2(params: &Params) -> Argon2<'static> {
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params.clone())
}

fn hash_with(params: &Params, password: &str) -> Result<String, PasswordError> {
    let mut salt_bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes).map_err(PasswordError::Hash)?;
    let hash = argon2(params)
        .hash_password(password.as_bytes(), &salt)
        .map_err(PasswordError::Hash)?;
    Ok(hash.to_string())
}

fn verify_hash(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    // Cost parameters are read back from the stored hash.
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

fn base64_secret(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD_NO_PAD.encode(bytes)
}

/// Cheap cost settings for tests.
#[cfg(test)]
pub(crate) fn test_params() -> Params {
    Params::new(1024, 1, 1, None).unwrap()
}
