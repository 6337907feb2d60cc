use rand::rngs::OsRng;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha512;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("rsa operation failed: {0}")]
    Rsa(#[from] rsa::Error),
}

/// Encrypts `msg` under `public_key`, chunking the plaintext into blocks
/// small enough for OAEP/SHA-512 and concatenating the resulting
/// ciphertext blocks — a direct translation of the original's
/// `EncryptOAEP`, which splits input into `keySize - 2*hashSize - 2` byte
/// steps because RSA-OAEP has no native support for messages longer than
/// that.
pub fn encrypt(public_key: &RsaPublicKey, msg: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let hash_size = 64; // SHA-512 digest size
    let step = public_key.size().saturating_sub(2 * hash_size + 2);
    let mut out = Vec::with_capacity(msg.len());

    for chunk in msg.chunks(step.max(1)) {
        let block = public_key.encrypt(&mut OsRng, Oaep::new::<Sha512>(), chunk)?;
        out.extend_from_slice(&block);
    }

    Ok(out)
}

/// Decrypts `ciphertext` under `private_key`, reading it back in
/// fixed-size blocks of `private_key`'s modulus size — the inverse of
/// [`encrypt`], mirroring the original's `DecryptOAEP`.
pub fn decrypt(private_key: &RsaPrivateKey, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let step = private_key.size();
    let mut out = Vec::with_capacity(ciphertext.len());

    for chunk in ciphertext.chunks(step) {
        let block = private_key.decrypt(Oaep::new::<Sha512>(), chunk)?;
        out.extend_from_slice(&block);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs1::EncodeRsaPublicKey;

    fn keypair() -> (RsaPrivateKey, RsaPublicKey) {
        // 2048 bits gives a step of 2048/8 - 130 = 126 bytes per OAEP/SHA-512
        // block, large enough to exercise chunking without a slow test.
        let private = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let public = RsaPublicKey::from(&private);
        (private, public)
    }

    #[test]
    fn round_trips_short_message() {
        let (private, public) = keypair();
        let msg = b"hello metrics";

        let ciphertext = encrypt(&public, msg).unwrap();
        let plaintext = decrypt(&private, &ciphertext).unwrap();

        assert_eq!(plaintext, msg);
    }

    #[test]
    fn round_trips_message_longer_than_one_block() {
        let (private, public) = keypair();
        let msg = vec![b'x'; 500];

        let ciphertext = encrypt(&public, &msg).unwrap();
        let plaintext = decrypt(&private, &ciphertext).unwrap();

        assert_eq!(plaintext, msg);
    }
}
