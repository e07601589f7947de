//! RSA signing key pair.
//!
//! The private key signs every token, its public counterpart verifies them.
//! Both are loaded once at startup and only read afterwards.

use std::path::{Path, PathBuf};

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use openssl::rsa::Rsa;
use thiserror::Error;

/// Bit length of generated development keys.
const GENERATED_KEY_BITS: u32 = 2048;

pub const PRIVATE_KEY_FILE: &str = "app.rsa";
pub const PUBLIC_KEY_FILE: &str = "app.rsa.pub";

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("failed to read key file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(jsonwebtoken::errors::Error),
    #[error("invalid public key: {0}")]
    InvalidPublicKey(jsonwebtoken::errors::Error),
    #[error("public key does not verify signatures made by the private key")]
    Mismatch,
    #[error("key generation failed: {0}")]
    Generate(#[from] openssl::error::ErrorStack),
}

/// Loaded signing and verification keys.
#[derive(Clone)]
pub struct KeyMaterial {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyMaterial {
    /// Build from PEM bytes and check that the pair belongs together.
    pub fn from_pem(private_pem: &[u8], public_pem: &[u8]) -> Result<Self, KeyError> {
        let encoding = EncodingKey::from_rsa_pem(private_pem).map_err(KeyError::InvalidPrivateKey)?;
        let decoding = DecodingKey::from_rsa_pem(public_pem).map_err(KeyError::InvalidPublicKey)?;
        let keys = Self { encoding, decoding };
        keys.check_pair()?;
        Ok(keys)
    }

    /// Read both PEM files from disk.
    pub fn load(private_path: &Path, public_path: &Path) -> Result<Self, KeyError> {
        let private_pem = read_key_file(private_path)?;
        let public_pem = read_key_file(public_path)?;
        Self::from_pem(&private_pem, &public_pem)
    }

    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }

    /// Sign a probe payload and verify it with the public key.
    fn check_pair(&self) -> Result<(), KeyError> {
        let probe = serde_json::json!({ "probe": true });
        let token = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &probe, &self.encoding)
            .map_err(KeyError::InvalidPrivateKey)?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;

        jsonwebtoken::decode::<serde_json::Value>(&token, &self.decoding, &validation)
            .map(|_| ())
            .map_err(|_| KeyError::Mismatch)
    }
}

fn read_key_file(path: &Path) -> Result<Vec<u8>, KeyError> {
    std::fs::read(path).map_err(io_error(path))
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> KeyError {
    let path = path.to_path_buf();
    move |source| KeyError::Io { path, source }
}

/// A freshly generated PEM key pair.
pub struct KeyPairPem {
    pub private_pem: Vec<u8>,
    pub public_pem: Vec<u8>,
}

impl KeyPairPem {
    /// Generate a new RSA key pair (PKCS#1 PEM).
    pub fn generate() -> Result<Self, KeyError> {
        let rsa = Rsa::generate(GENERATED_KEY_BITS)?;
        Ok(Self {
            private_pem: rsa.private_key_to_pem()?,
            public_pem: rsa.public_key_to_pem_pkcs1()?,
        })
    }

    /// Write `app.rsa` and `app.rsa.pub` into `dir`, creating it if needed.
    pub fn write_to(&self, dir: &Path) -> Result<(PathBuf, PathBuf), KeyError> {
        std::fs::create_dir_all(dir).map_err(io_error(dir))?;
        let private_path = dir.join(PRIVATE_KEY_FILE);
        let public_path = dir.join(PUBLIC_KEY_FILE);
        std::fs::write(&private_path, &self.private_pem).map_err(io_error(&private_path))?;
        std::fs::write(&public_path, &self.public_pem).map_err(io_error(&public_path))?;
        Ok((private_path, public_path))
    }

    pub fn into_key_material(self) -> Result<KeyMaterial, KeyError> {
        KeyMaterial::from_pem(&self.private_pem, &self.public_pem)
    }
}
