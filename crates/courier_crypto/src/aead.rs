//! Authenticated Encryption with Associated Data
//!
//! Uses ChaCha20-Poly1305 (IETF, 96-bit nonce).
//! Key size: 32 bytes.  Nonce: 12 bytes (random, carried separately).  Tag: 16 bytes.
//!
//! Unlike a framed format, the nonce is NOT prepended to the ciphertext: the
//! envelope carries it as its own field alongside the ephemeral key.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::CryptoError;

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// Fresh random nonce from the OS RNG.
pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypt `plaintext`; returns ciphertext with the 16-byte tag appended.
pub fn encrypt(
    key: &[u8; 32],
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = ChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::AeadEncrypt)?;
    cipher
        .encrypt(Nonce::from_slice(nonce), Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::AeadEncrypt)
}

/// Decrypt ciphertext+tag. A tag mismatch yields `AeadDecrypt` and no output.
pub fn decrypt(
    key: &[u8; 32],
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if ciphertext.len() < TAG_LEN {
        return Err(CryptoError::AeadDecrypt);
    }
    let cipher = ChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::AeadDecrypt)?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map_err(|_| CryptoError::AeadDecrypt)?;
    Ok(Zeroizing::new(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_is_appended() {
        let key = [9u8; 32];
        let nonce = generate_nonce();
        let ct = encrypt(&key, &nonce, b"abc", b"").unwrap();
        assert_eq!(ct.len(), 3 + TAG_LEN);
        assert_eq!(decrypt(&key, &nonce, &ct, b"").unwrap().as_slice(), b"abc");
    }

    #[test]
    fn wrong_nonce_fails_closed() {
        let key = [9u8; 32];
        let nonce = [1u8; NONCE_LEN];
        let ct = encrypt(&key, &nonce, b"abc", b"").unwrap();
        let err = decrypt(&key, &[2u8; NONCE_LEN], &ct, b"").unwrap_err();
        assert!(matches!(err, CryptoError::AeadDecrypt));
    }

    #[test]
    fn truncated_ciphertext_rejected() {
        let err = decrypt(&[0u8; 32], &[0u8; NONCE_LEN], &[0u8; 8], b"").unwrap_err();
        assert!(matches!(err, CryptoError::AeadDecrypt));
    }
}
