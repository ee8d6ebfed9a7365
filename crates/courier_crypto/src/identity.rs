//! Identity key management
//!
//! Each principal holds TWO independent keypairs:
//!   - a signing keypair (Ed25519) — authenticates envelopes,
//!   - an encryption keypair (X25519) — receives sealed bundles.
//!
//! Neither key is derived from or converted into the other. Only the public
//! halves (plus an optional alias) are published to the directory.
//!
//! Public keys travel as lower-case hex. Comparison is case-insensitive;
//! see `PublicKeyBytes::matches_hex`.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier as _, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::ZeroizeOnDrop;

use crate::error::CryptoError;

// ── Newtype wrappers ──────────────────────────────────────────────────────────

/// 32-byte public key (Ed25519 or X25519), hex-encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKeyBytes(pub [u8; 32]);

impl PublicKeyBytes {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Accepts either case.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s.trim())?;
        let arr: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            CryptoError::InvalidKey(format!("Public key must be 32 bytes, got {}", b.len()))
        })?;
        Ok(Self(arr))
    }

    /// Case-insensitive comparison against a hex string.
    pub fn matches_hex(&self, s: &str) -> bool {
        s.trim().eq_ignore_ascii_case(&self.to_hex())
    }

    /// First 8 hex chars, for log lines.
    pub fn short(&self) -> String {
        self.to_hex()[..8].to_string()
    }
}

/// Lower-case a hex public key for comparison and routing.
///
/// Only public keys are normalised this way. Signatures are never passed
/// through this: base64 is case-sensitive.
pub fn normalize_key_hex(s: &str) -> String {
    s.trim().to_ascii_lowercase()
}

/// Verify a raw Ed25519 signature with a 32-byte public key.
pub fn verify_signature(public: &[u8; 32], msg: &[u8], sig_bytes: &[u8]) -> Result<(), CryptoError> {
    let vk = VerifyingKey::from_bytes(public).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    let sig = Signature::from_bytes(
        sig_bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("Bad sig len".into()))?,
    );
    vk.verify(msg, &sig).map_err(|_| CryptoError::SignatureVerification)
}

/// Domain separator for directory record signatures.
const RECORD_CONTEXT: &[u8] = b"courier-identity-record-v1";

// ── Identity ──────────────────────────────────────────────────────────────────

/// A principal's private key material. Drop clears memory via ZeroizeOnDrop.
#[derive(ZeroizeOnDrop)]
pub struct Identity {
    #[zeroize(skip)]
    signing_public: PublicKeyBytes,
    #[zeroize(skip)]
    encryption_public: PublicKeyBytes,
    #[zeroize(skip)]
    alias: Option<String>,
    signing_secret: [u8; 32],
    encryption_secret: [u8; 32],
}

impl Identity {
    pub fn generate(alias: Option<String>) -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let encryption_secret = StaticSecret::random_from_rng(OsRng);
        Self::from_parts(signing_key.to_bytes(), encryption_secret.to_bytes(), alias)
    }

    pub fn from_bytes(
        signing_secret: &[u8],
        encryption_secret: &[u8],
        alias: Option<String>,
    ) -> Result<Self, CryptoError> {
        let signing: [u8; 32] = signing_secret.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!(
                "Signing key must be 32 bytes, got {}",
                signing_secret.len()
            ))
        })?;
        let encryption: [u8; 32] = encryption_secret.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!(
                "Encryption key must be 32 bytes, got {}",
                encryption_secret.len()
            ))
        })?;
        Ok(Self::from_parts(signing, encryption, alias))
    }

    /// Load from hex-encoded secrets (e.g. environment variables).
    pub fn from_hex(
        signing_secret_hex: &str,
        encryption_secret_hex: &str,
        alias: Option<String>,
    ) -> Result<Self, CryptoError> {
        let signing = zeroize::Zeroizing::new(hex::decode(signing_secret_hex.trim())?);
        let encryption = zeroize::Zeroizing::new(hex::decode(encryption_secret_hex.trim())?);
        Self::from_bytes(&signing, &encryption, alias)
    }

    fn from_parts(signing_secret: [u8; 32], encryption_secret: [u8; 32], alias: Option<String>) -> Self {
        let signing_public =
            PublicKeyBytes(SigningKey::from_bytes(&signing_secret).verifying_key().to_bytes());
        let encryption_public =
            PublicKeyBytes(X25519Public::from(&StaticSecret::from(encryption_secret)).to_bytes());
        Self {
            signing_public,
            encryption_public,
            alias,
            signing_secret,
            encryption_secret,
        }
    }

    pub fn signing_public(&self) -> &PublicKeyBytes {
        &self.signing_public
    }

    pub fn encryption_public(&self) -> &PublicKeyBytes {
        &self.encryption_public
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn signing_secret_bytes(&self) -> &[u8; 32] {
        &self.signing_secret
    }

    pub fn encryption_secret_bytes(&self) -> &[u8; 32] {
        &self.encryption_secret
    }

    pub(crate) fn encryption_secret(&self) -> StaticSecret {
        StaticSecret::from(self.encryption_secret)
    }

    /// Sign arbitrary bytes; returns 64-byte raw Ed25519 signature.
    pub fn sign(&self, msg: &[u8]) -> [u8; 64] {
        SigningKey::from_bytes(&self.signing_secret).sign(msg).to_bytes()
    }

    /// Hex Ed25519 signature over `record.signing_input()`.
    ///
    /// The directory accepts a record only with this proof from the key it
    /// names, so a record for another signing key is refused here.
    pub fn sign_record(&self, record: &PublicIdentity) -> Result<String, CryptoError> {
        if !self.signing_public.matches_hex(&record.signing_key) {
            return Err(CryptoError::InvalidKey(format!(
                "record names {} but identity is {}",
                record.signing_key,
                self.signing_public.short()
            )));
        }
        Ok(hex::encode(self.sign(&record.signing_input())))
    }

    /// The public record published to the directory.
    pub fn public_record(&self) -> PublicIdentity {
        PublicIdentity {
            signing_key: self.signing_public.to_hex(),
            encryption_key: Some(self.encryption_public.to_hex()),
            alias: self.alias.clone(),
        }
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("signing_public", &self.signing_public.to_hex())
            .field("encryption_public", &self.encryption_public.to_hex())
            .field("alias", &self.alias)
            .finish_non_exhaustive()
    }
}

/// Public halves of an identity, as stored in the shared directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicIdentity {
    /// Hex Ed25519 public key — the principal's address.
    pub signing_key: String,
    /// Hex X25519 public key. Older records may not carry one.
    pub encryption_key: Option<String>,
    pub alias: Option<String>,
}

impl PublicIdentity {
    /// Bytes signed to claim this record. Keys are lower-cased and every
    /// field is length-prefixed, so an absent field never equals an empty one.
    pub fn signing_input(&self) -> Vec<u8> {
        let mut out = RECORD_CONTEXT.to_vec();
        push_field(&mut out, Some(&normalize_key_hex(&self.signing_key)));
        push_field(
            &mut out,
            self.encryption_key.as_deref().map(normalize_key_hex).as_deref(),
        );
        push_field(&mut out, self.alias.as_deref());
        out
    }

    /// Check a hex signature by `signing_key` over `signing_input()`.
    pub fn verify_record_signature(&self, signature_hex: &str) -> Result<(), CryptoError> {
        let key = PublicKeyBytes::from_hex(&self.signing_key)?;
        let sig = hex::decode(signature_hex.trim())?;
        verify_signature(&key.0, &self.signing_input(), &sig)
    }

    pub fn encryption_key_bytes(&self) -> Result<PublicKeyBytes, CryptoError> {
        match &self.encryption_key {
            Some(k) => PublicKeyBytes::from_hex(k),
            None => Err(CryptoError::MissingEncryptionKey(self.signing_key.clone())),
        }
    }
}

fn push_field(out: &mut Vec<u8>, field: Option<&str>) {
    match field {
        None => out.push(0),
        Some(s) => {
            out.push(1);
            out.extend_from_slice(&(s.len() as u32).to_be_bytes());
            out.extend_from_slice(s.as_bytes());
        }
    }
}
