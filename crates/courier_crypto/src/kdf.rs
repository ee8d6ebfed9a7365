//! Key derivation functions
//!
//! `hkdf_expand` — HKDF-SHA256 over an X25519 shared secret.
//! `derive_seal_key` — the per-bundle symmetric key used by `seal`/`open`.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// Domain-separation prefix for the envelope sealing key.
pub const SEAL_INFO_PREFIX: &[u8] = b"courier-envelope-seal-v1";

/// Expand `ikm` + `info` into `output.len()` bytes of key material.
///
/// `salt` may be `None` (HKDF will use a zeroed salt, identical to an empty one).
pub fn hkdf_expand(
    ikm: &[u8],
    salt: Option<&[u8]>,
    info: &[u8],
    output: &mut [u8],
) -> Result<(), CryptoError> {
    let hk = Hkdf::<Sha256>::new(salt, ikm);
    hk.expand(info, output)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))
}

/// `info = SEAL_INFO_PREFIX || ephemeral_pub || recipient_pub`
pub fn seal_info(ephemeral_pub: &[u8; 32], recipient_pub: &[u8; 32]) -> Vec<u8> {
    let mut info = Vec::with_capacity(SEAL_INFO_PREFIX.len() + 64);
    info.extend_from_slice(SEAL_INFO_PREFIX);
    info.extend_from_slice(ephemeral_pub);
    info.extend_from_slice(recipient_pub);
    info
}

/// Derive the 32-byte AEAD key binding a shared secret to both parties' keys.
pub fn derive_seal_key(
    shared_secret: &[u8; 32],
    ephemeral_pub: &[u8; 32],
    recipient_pub: &[u8; 32],
) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
    let mut key = Zeroizing::new([0u8; 32]);
    hkdf_expand(
        shared_secret,
        None,
        &seal_info(ephemeral_pub, recipient_pub),
        &mut key[..],
    )?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_binds_both_keys() {
        let a = seal_info(&[1u8; 32], &[2u8; 32]);
        let b = seal_info(&[2u8; 32], &[1u8; 32]);
        assert_ne!(a, b);
        assert!(a.starts_with(SEAL_INFO_PREFIX));
        assert_eq!(a.len(), SEAL_INFO_PREFIX.len() + 64);
    }

    #[test]
    fn empty_salt_equals_no_salt() {
        let mut with_none = [0u8; 32];
        let mut with_empty = [0u8; 32];
        hkdf_expand(b"ikm", None, b"info", &mut with_none).unwrap();
        hkdf_expand(b"ikm", Some(&[][..]), b"info", &mut with_empty).unwrap();
        assert_eq!(with_none, with_empty);
    }

    #[test]
    fn different_recipients_derive_different_keys() {
        let shared = [7u8; 32];
        let k1 = derive_seal_key(&shared, &[1u8; 32], &[2u8; 32]).unwrap();
        let k2 = derive_seal_key(&shared, &[1u8; 32], &[3u8; 32]).unwrap();
        assert_ne!(*k1, *k2);
    }
}
