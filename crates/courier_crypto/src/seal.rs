//! Ephemeral-static sealing of small payloads.
//!
//! seal(P, R):
//!   EK        = fresh X25519 keypair (never reused)
//!   shared    = X25519(EK_priv, R)
//!   key       = HKDF-SHA256(salt = ∅, ikm = shared,
//!                           info = SEAL_INFO_PREFIX || EK_pub || R)
//!   nonce     = 12 random bytes
//!   bundle    = { ChaCha20-Poly1305(key, nonce, P), EK_pub, nonce }
//!
//! open(bundle, r) mirrors this with X25519(r, EK_pub).
//!
//! A `CipherBundle` is only ever handled as a unit: the three fields are
//! never stored, encoded or passed around separately.

use rand::rngs::OsRng;
use x25519_dalek::{EphemeralSecret, PublicKey as X25519Public};
use zeroize::Zeroizing;

use crate::{
    aead::{self, NONCE_LEN, TAG_LEN},
    error::CryptoError,
    identity::{Identity, PublicKeyBytes},
    kdf,
};

#[derive(Clone, PartialEq, Eq)]
pub struct CipherBundle {
    pub ciphertext: Vec<u8>,
    pub ephemeral_public_key: [u8; 32],
    pub nonce: [u8; NONCE_LEN],
}

impl CipherBundle {
    /// Rebuild a bundle from decoded wire bytes, checking structural lengths.
    pub fn from_parts(
        ciphertext: Vec<u8>,
        ephemeral_public_key: &[u8],
        nonce: &[u8],
    ) -> Result<Self, CryptoError> {
        let ephemeral_public_key: [u8; 32] = ephemeral_public_key.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!(
                "ephemeral key must be 32 bytes, got {}",
                ephemeral_public_key.len()
            ))
        })?;
        let nonce: [u8; NONCE_LEN] = nonce.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!("nonce must be {NONCE_LEN} bytes, got {}", nonce.len()))
        })?;
        if ciphertext.len() < TAG_LEN {
            return Err(CryptoError::InvalidKey(format!(
                "ciphertext shorter than the {TAG_LEN}-byte tag"
            )));
        }
        Ok(Self { ciphertext, ephemeral_public_key, nonce })
    }

    /// Plaintext length implied by the ciphertext.
    pub fn plaintext_len(&self) -> usize {
        self.ciphertext.len().saturating_sub(TAG_LEN)
    }
}

impl std::fmt::Debug for CipherBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherBundle")
            .field("ciphertext_len", &self.ciphertext.len())
            .field("ephemeral_public_key", &hex::encode(self.ephemeral_public_key))
            .field("nonce", &hex::encode(self.nonce))
            .finish()
    }
}

/// Result of `seal_dual`.
#[derive(Debug, Clone)]
pub struct DualSealed {
    pub recipient: CipherBundle,
    /// Present only when the sender's own encryption key was supplied.
    pub sender: Option<CipherBundle>,
}

/// Seal `plaintext` for a single X25519 public key.
pub fn seal(plaintext: &[u8], recipient: &PublicKeyBytes) -> Result<CipherBundle, CryptoError> {
    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = X25519Public::from(&ephemeral).to_bytes();
    let shared = ephemeral.diffie_hellman(&X25519Public::from(recipient.0));
    if !shared.was_contributory() {
        return Err(CryptoError::InvalidKey("recipient key is a low-order point".into()));
    }
    let shared = Zeroizing::new(shared.to_bytes());

    let key = kdf::derive_seal_key(&shared, &ephemeral_public, &recipient.0)?;
    let nonce = aead::generate_nonce();
    let ciphertext = aead::encrypt(&key, &nonce, plaintext, &[])?;

    Ok(CipherBundle {
        ciphertext,
        ephemeral_public_key: ephemeral_public,
        nonce,
    })
}

/// Seal independently for the recipient and, when given, the sender's own key.
///
/// Each bundle gets its own ephemeral key and nonce. A missing sender key
/// means no sender bundle; it is never derived from the recipient bundle.
pub fn seal_dual(
    plaintext: &[u8],
    recipient: &PublicKeyBytes,
    sender: Option<&PublicKeyBytes>,
) -> Result<DualSealed, CryptoError> {
    let recipient_bundle = seal(plaintext, recipient)?;
    let sender_bundle = sender.map(|key| seal(plaintext, key)).transpose()?;
    Ok(DualSealed {
        recipient: recipient_bundle,
        sender: sender_bundle,
    })
}

/// Open a bundle with the holder's encryption identity.
pub fn open(bundle: &CipherBundle, own: &Identity) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let secret = own.encryption_secret();
    let shared = secret.diffie_hellman(&X25519Public::from(bundle.ephemeral_public_key));
    if !shared.was_contributory() {
        return Err(CryptoError::AeadDecrypt);
    }
    let shared = Zeroizing::new(shared.to_bytes());

    let key = kdf::derive_seal_key(
        &shared,
        &bundle.ephemeral_public_key,
        &own.encryption_public().0,
    )?;
    aead::decrypt(&key, &bundle.nonce, &bundle.ciphertext, &[])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        let bob = Identity::generate(None);
        let bundle = seal(b"{\"text\":\"hi\"}", bob.encryption_public()).unwrap();
        assert_eq!(bundle.plaintext_len(), 13);
        assert_eq!(open(&bundle, &bob).unwrap().as_slice(), b"{\"text\":\"hi\"}");
    }

    #[test]
    fn every_seal_uses_a_fresh_ephemeral_key_and_nonce() {
        let bob = Identity::generate(None);
        let a = seal(b"same", bob.encryption_public()).unwrap();
        let b = seal(b"same", bob.encryption_public()).unwrap();
        assert_ne!(a.ephemeral_public_key, b.ephemeral_public_key);
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn dual_seal_opens_for_both_parties() {
        let alice = Identity::generate(None);
        let bob = Identity::generate(None);
        let sealed = seal_dual(b"hello", bob.encryption_public(), Some(alice.encryption_public()))
            .unwrap();
        let sender = sealed.sender.expect("sender bundle");
        assert_ne!(sealed.recipient.ephemeral_public_key, sender.ephemeral_public_key);
        assert_eq!(open(&sealed.recipient, &bob).unwrap().as_slice(), b"hello");
        assert_eq!(open(&sender, &alice).unwrap().as_slice(), b"hello");
    }

    #[test]
    fn dual_seal_without_sender_key_omits_sender_bundle() {
        let bob = Identity::generate(None);
        let sealed = seal_dual(b"hello", bob.encryption_public(), None).unwrap();
        assert!(sealed.sender.is_none());
    }

    #[test]
    fn wrong_recipient_cannot_open() {
        let bob = Identity::generate(None);
        let eve = Identity::generate(None);
        let bundle = seal(b"secret", bob.encryption_public()).unwrap();
        assert!(matches!(open(&bundle, &eve), Err(CryptoError::AeadDecrypt)));
    }

    #[test]
    fn from_parts_checks_lengths() {
        assert!(CipherBundle::from_parts(vec![0u8; 16], &[0u8; 31], &[0u8; 12]).is_err());
        assert!(CipherBundle::from_parts(vec![0u8; 16], &[0u8; 32], &[0u8; 24]).is_err());
        assert!(CipherBundle::from_parts(vec![0u8; 15], &[0u8; 32], &[0u8; 12]).is_err());
        assert!(CipherBundle::from_parts(vec![0u8; 16], &[0u8; 32], &[0u8; 12]).is_ok());
    }
}
