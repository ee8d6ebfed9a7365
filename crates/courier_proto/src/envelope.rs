//! Signed, encrypted envelope — the unit the relay stores and forwards.
//!
//! The relay sees routing metadata (`fromPublicKey`, `toPublicKeys`,
//! timestamps, thread references) but never the plaintext. Everything except
//! `signature` is covered by the signature; mutating any field after signing
//! invalidates it.

use serde_json::{json, Map, Value};

use courier_crypto::{identity::normalize_key_hex, CipherBundle};

use crate::{canonical, encoding::ByteEncoding};

pub const ENVELOPE_VERSION: u32 = 1;

/// Shape of the ciphertext field on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BundleShape {
    /// `encryptedPayload` is a string; ephemeral key and nonce are siblings.
    Flat,
    /// `encryptedPayload` is `{ciphertext, ephemeralPublicKey, nonce}`.
    Nested,
}

/// How an envelope's bundles were (or will be) written on the wire.
///
/// Recorded by the codec so the canonical form reproduces the exact strings
/// the sender signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WireFormat {
    pub encoding: ByteEncoding,
    pub shape: BundleShape,
}

impl Default for WireFormat {
    fn default() -> Self {
        Self {
            encoding: ByteEncoding::Base64Standard,
            shape: BundleShape::Flat,
        }
    }
}

impl WireFormat {
    pub fn new(encoding: ByteEncoding, shape: BundleShape) -> Self {
        Self { encoding, shape }
    }

    /// Signatures follow the bundle encoding: hex envelopes carry hex signatures.
    pub fn signature_encoding(&self) -> ByteEncoding {
        self.encoding
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub id: String,
    pub version: u32,
    /// Sender's hex Ed25519 key, verbatim as sent.
    pub from_public_key: String,
    pub to_public_keys: Vec<String>,
    pub payload_type: String,
    pub recipient_bundle: CipherBundle,
    pub sender_bundle: Option<CipherBundle>,
    /// Plaintext byte length before encryption.
    pub payload_size: u64,
    pub thread_id: Option<String>,
    pub reply_to_id: Option<String>,
    pub forward_of_id: Option<String>,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub expires_at: Option<i64>,
    pub priority: i32,
    /// Case-sensitive encoded signature. Empty until signed.
    pub signature: String,
    pub wire_format: WireFormat,
}

impl Envelope {
    /// Fixed list of signed wire fields, `signature` excluded.
    ///
    /// Absent optionals are simply not pushed, so a field added here later
    /// cannot be forgotten by the null-exclusion rule.
    pub fn signed_fields(&self) -> Vec<(&'static str, Value)> {
        let fmt = self.wire_format;
        let mut fields: Vec<(&'static str, Value)> = vec![
            ("id", json!(self.id)),
            ("version", json!(self.version)),
            ("fromPublicKey", json!(self.from_public_key)),
            ("toPublicKeys", json!(self.to_public_keys)),
            ("payloadType", json!(self.payload_type)),
        ];

        push_bundle(
            &mut fields,
            &self.recipient_bundle,
            fmt,
            ["encryptedPayload", "ephemeralPublicKey", "nonce"],
        );
        if let Some(sender) = &self.sender_bundle {
            push_bundle(
                &mut fields,
                sender,
                fmt,
                ["senderEncryptedPayload", "senderEphemeralPublicKey", "senderNonce"],
            );
        }

        fields.push(("payloadSize", json!(self.payload_size)));
        if let Some(v) = &self.thread_id {
            fields.push(("threadId", json!(v)));
        }
        if let Some(v) = &self.reply_to_id {
            fields.push(("replyToId", json!(v)));
        }
        if let Some(v) = &self.forward_of_id {
            fields.push(("forwardOfId", json!(v)));
        }
        fields.push(("timestamp", json!(self.timestamp)));
        if let Some(v) = self.expires_at {
            fields.push(("expiresAt", json!(v)));
        }
        fields.push(("priority", json!(self.priority)));
        fields
    }

    /// The exact string hashed for signing and verification.
    pub fn canonical_form(&self) -> String {
        let map: Map<String, Value> = self
            .signed_fields()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        canonical::canonicalize(&Value::Object(map))
    }

    /// Lower-cased sender key, for routing and comparison.
    pub fn from_key_normalized(&self) -> String {
        normalize_key_hex(&self.from_public_key)
    }

    pub fn to_keys_normalized(&self) -> Vec<String> {
        self.to_public_keys.iter().map(|k| normalize_key_hex(k)).collect()
    }

    pub fn is_from(&self, key_hex: &str) -> bool {
        self.from_public_key.trim().eq_ignore_ascii_case(key_hex.trim())
    }

    pub fn is_addressed_to(&self, key_hex: &str) -> bool {
        self.to_public_keys
            .iter()
            .any(|k| k.trim().eq_ignore_ascii_case(key_hex.trim()))
    }

    /// `expiresAt` is in the past relative to `now_ms`.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        self.expires_at.is_some_and(|t| t <= now_ms)
    }
}

fn push_bundle(
    fields: &mut Vec<(&'static str, Value)>,
    bundle: &CipherBundle,
    fmt: WireFormat,
    names: [&'static str; 3],
) {
    let enc = fmt.encoding;
    let ciphertext = enc.encode(&bundle.ciphertext);
    let ephemeral = enc.encode(&bundle.ephemeral_public_key);
    let nonce = enc.encode(&bundle.nonce);
    match fmt.shape {
        BundleShape::Flat => {
            fields.push((names[0], json!(ciphertext)));
            fields.push((names[1], json!(ephemeral)));
            fields.push((names[2], json!(nonce)));
        }
        BundleShape::Nested => {
            fields.push((
                names[0],
                json!({
                    "ciphertext": ciphertext,
                    "ephemeralPublicKey": ephemeral,
                    "nonce": nonce,
                }),
            ));
        }
    }
}
