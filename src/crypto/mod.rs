mod rsa_chunk;

pub use rsa_chunk::{decrypt, encrypt, CryptoError};

use std::path::Path;

use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("reading key file: {0}")]
    Io(#[from] std::io::Error),

    #[error("parsing PKCS1 PEM key: {0}")]
    Pkcs1(#[from] rsa::pkcs1::Error),
}

/// Loads a PKCS1 PEM-encoded private key, or returns `Ok(None)` if `path` is
/// empty — encryption is entirely optional and off by default.
pub fn load_private_key(path: &str) -> Result<Option<RsaPrivateKey>, KeyError> {
    if path.is_empty() {
        return Ok(None);
    }

    let pem = std::fs::read_to_string(Path::new(path))?;
    let key = RsaPrivateKey::from_pkcs1_pem(&pem)?;
    Ok(Some(key))
}

/// Loads a PKCS1 PEM-encoded public key, or returns `Ok(None)` if `path` is
/// empty.
pub fn load_public_key(path: &str) -> Result<Option<RsaPublicKey>, KeyError> {
    if path.is_empty() {
        return Ok(None);
    }

    let pem = std::fs::read_to_string(Path::new(path))?;
    let key = RsaPublicKey::from_pkcs1_pem(&pem)?;
    Ok(Some(key))
}
