//! Wire codec — JSON envelope <-> typed `Envelope`.
//!
//! Two historical shapes of the ciphertext field are accepted:
//!
//!   flat:   "encryptedPayload": "<ct>", "ephemeralPublicKey": "<k>", "nonce": "<n>"
//!   nested: "encryptedPayload": { "ciphertext": "<ct>", "ephemeralPublicKey": "<k>", "nonce": "<n>" }
//!
//! The shape is resolved here, once, via an untagged enum; nothing past this
//! module branches on it. Byte encodings are detected as described in
//! `encoding`. A bundle that no candidate decodes is rejected outright.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use courier_crypto::{CipherBundle, PublicKeyBytes};

use crate::{
    encoding::{candidates_for, ByteEncoding},
    envelope::{BundleShape, Envelope, WireFormat},
    error::ProtoError,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawCiphertext {
    Flat(String),
    Nested(NestedBundle),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NestedBundle {
    ciphertext: String,
    ephemeral_public_key: String,
    nonce: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEnvelope {
    id: String,
    version: u32,
    from_public_key: String,
    to_public_keys: Vec<String>,
    payload_type: String,
    encrypted_payload: RawCiphertext,
    #[serde(default)]
    ephemeral_public_key: Option<String>,
    #[serde(default)]
    nonce: Option<String>,
    #[serde(default)]
    sender_encrypted_payload: Option<RawCiphertext>,
    #[serde(default)]
    sender_ephemeral_public_key: Option<String>,
    #[serde(default)]
    sender_nonce: Option<String>,
    payload_size: u64,
    #[serde(default)]
    thread_id: Option<String>,
    #[serde(default)]
    reply_to_id: Option<String>,
    #[serde(default)]
    forward_of_id: Option<String>,
    timestamp: i64,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    priority: i32,
    signature: String,
}

/// The three encoded strings of one bundle plus the shape they came in.
struct BundleStrings {
    ciphertext: String,
    ephemeral_public_key: String,
    nonce: String,
    shape: BundleShape,
}

fn bundle_strings(
    raw: RawCiphertext,
    sibling_key: Option<String>,
    sibling_nonce: Option<String>,
    label: &str,
) -> Result<BundleStrings, ProtoError> {
    match raw {
        RawCiphertext::Nested(n) => Ok(BundleStrings {
            ciphertext: n.ciphertext,
            ephemeral_public_key: n.ephemeral_public_key,
            nonce: n.nonce,
            shape: BundleShape::Nested,
        }),
        RawCiphertext::Flat(ciphertext) => {
            let ephemeral_public_key = sibling_key.ok_or_else(|| {
                ProtoError::MalformedEnvelope(format!("{label}: flat ciphertext without ephemeral key"))
            })?;
            let nonce = sibling_nonce.ok_or_else(|| {
                ProtoError::MalformedEnvelope(format!("{label}: flat ciphertext without nonce"))
            })?;
            Ok(BundleStrings {
                ciphertext,
                ephemeral_public_key,
                nonce,
                shape: BundleShape::Flat,
            })
        }
    }
}

fn try_decode(strings: &BundleStrings, encoding: ByteEncoding) -> Option<CipherBundle> {
    let ciphertext = encoding.decode(&strings.ciphertext).ok()?;
    let ephemeral = encoding.decode(&strings.ephemeral_public_key).ok()?;
    let nonce = encoding.decode(&strings.nonce).ok()?;
    CipherBundle::from_parts(ciphertext, &ephemeral, &nonce).ok()
}

/// Run the detection order over the recipient bundle and, when present, the
/// sender bundle. The first encoding that yields valid lengths for both wins.
fn detect_bundles(
    recipient: &BundleStrings,
    sender: Option<&BundleStrings>,
) -> Result<(CipherBundle, Option<CipherBundle>, ByteEncoding), ProtoError> {
    for encoding in candidates_for(&recipient.ciphertext) {
        let Some(recipient_bundle) = try_decode(recipient, encoding) else {
            continue;
        };
        match sender {
            None => return Ok((recipient_bundle, None, encoding)),
            Some(strings) => {
                if let Some(sender_bundle) = try_decode(strings, encoding) {
                    return Ok((recipient_bundle, Some(sender_bundle), encoding));
                }
            }
        }
    }
    Err(ProtoError::Encoding(
        "ciphertext bundles match no common hex or base64 variant".into(),
    ))
}

fn validate_key(label: &str, key: &str) -> Result<(), ProtoError> {
    PublicKeyBytes::from_hex(key)
        .map(|_| ())
        .map_err(|e| ProtoError::MalformedEnvelope(format!("{label}: {e}")))
}

/// Parse a wire envelope from JSON text.
pub fn decode_envelope(json: &str) -> Result<Envelope, ProtoError> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| ProtoError::MalformedEnvelope(e.to_string()))?;
    decode_envelope_value(value)
}

/// Parse a wire envelope from an already-parsed JSON value.
pub fn decode_envelope_value(value: Value) -> Result<Envelope, ProtoError> {
    let wire: WireEnvelope = serde_json::from_value(value)
        .map_err(|e| ProtoError::MalformedEnvelope(e.to_string()))?;

    validate_key("fromPublicKey", &wire.from_public_key)?;
    if wire.to_public_keys.is_empty() {
        return Err(ProtoError::MalformedEnvelope("toPublicKeys is empty".into()));
    }
    for key in &wire.to_public_keys {
        validate_key("toPublicKeys", key)?;
    }

    let recipient_strings = bundle_strings(
        wire.encrypted_payload,
        wire.ephemeral_public_key,
        wire.nonce,
        "encryptedPayload",
    )?;

    let sender_strings = match wire.sender_encrypted_payload {
        Some(raw) => {
            let strings = bundle_strings(
                raw,
                wire.sender_ephemeral_public_key,
                wire.sender_nonce,
                "senderEncryptedPayload",
            )?;
            if strings.shape != recipient_strings.shape {
                return Err(ProtoError::MalformedEnvelope(
                    "sender bundle shape differs from recipient bundle".into(),
                ));
            }
            Some(strings)
        }
        None => {
            if wire.sender_ephemeral_public_key.is_some() || wire.sender_nonce.is_some() {
                return Err(ProtoError::MalformedEnvelope(
                    "sender key/nonce present without senderEncryptedPayload".into(),
                ));
            }
            None
        }
    };

    // One envelope, one encoding: both bundles must decode under it.
    let (recipient_bundle, sender_bundle, encoding) =
        detect_bundles(&recipient_strings, sender_strings.as_ref())?;
    let wire_format = WireFormat::new(encoding, recipient_strings.shape);

    Ok(Envelope {
        id: wire.id,
        version: wire.version,
        from_public_key: wire.from_public_key,
        to_public_keys: wire.to_public_keys,
        payload_type: wire.payload_type,
        recipient_bundle,
        sender_bundle,
        payload_size: wire.payload_size,
        thread_id: wire.thread_id,
        reply_to_id: wire.reply_to_id,
        forward_of_id: wire.forward_of_id,
        timestamp: wire.timestamp,
        expires_at: wire.expires_at,
        priority: wire.priority,
        signature: wire.signature,
        wire_format,
    })
}

/// Serialise to wire JSON in the envelope's own `WireFormat`.
///
/// Nullable reference fields are written as explicit `null`s, as the other
/// clients do; the canonical form drops them again.
pub fn encode_envelope(envelope: &Envelope) -> Value {
    let mut map: Map<String, Value> = envelope
        .signed_fields()
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    for nullable in ["threadId", "replyToId", "forwardOfId", "expiresAt"] {
        map.entry(nullable).or_insert(Value::Null);
    }
    map.insert("signature".into(), Value::String(envelope.signature.clone()));
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::tests::sample_envelope;
    use serde_json::json;

    #[test]
    fn encode_then_decode_preserves_envelope() {
        let env = sample_envelope();
        let decoded = decode_envelope_value(encode_envelope(&env)).unwrap();
        assert_eq!(decoded, env);
    }

    #[test]
    fn nested_hex_envelope_is_detected() {
        let mut env = sample_envelope();
        env.wire_format = WireFormat::new(ByteEncoding::Hex, BundleShape::Nested);
        let wire = encode_envelope(&env);
        assert!(wire["encryptedPayload"].is_object());
        let decoded = decode_envelope_value(wire).unwrap();
        assert_eq!(decoded.wire_format, env.wire_format);
        assert_eq!(decoded.recipient_bundle, env.recipient_bundle);
    }

    #[test]
    fn flat_ciphertext_without_nonce_is_malformed() {
        let mut wire = encode_envelope(&sample_envelope());
        wire.as_object_mut().unwrap().remove("nonce");
        assert!(matches!(
            decode_envelope_value(wire),
            Err(ProtoError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn garbage_ciphertext_is_an_encoding_error() {
        let mut wire = encode_envelope(&sample_envelope());
        wire["encryptedPayload"] = json!("!!not-any-encoding!!");
        assert!(matches!(decode_envelope_value(wire), Err(ProtoError::Encoding(_))));
    }

    #[test]
    fn wrong_nonce_length_is_an_encoding_error() {
        let mut wire = encode_envelope(&sample_envelope());
        wire["nonce"] = json!(ByteEncoding::Base64Standard.encode(&[0u8; 24]));
        assert!(matches!(decode_envelope_value(wire), Err(ProtoError::Encoding(_))));
    }

    #[test]
    fn explicit_nulls_are_accepted() {
        let mut env = sample_envelope();
        env.sender_bundle = None;
        let mut wire = encode_envelope(&env);
        wire["senderEncryptedPayload"] = Value::Null;
        wire["senderNonce"] = Value::Null;
        let decoded = decode_envelope_value(wire).unwrap();
        assert!(decoded.sender_bundle.is_none());
        assert!(decoded.thread_id.is_none());
    }

    #[test]
    fn encoding_is_resolved_across_both_bundles() {
        // Recipient strings are valid in every base64 flavour; the sender
        // ciphertext only in the URL-safe one.
        let mut env = sample_envelope();
        env.sender_bundle.as_mut().unwrap().ciphertext = vec![0xfb; 24];
        env.wire_format.encoding = ByteEncoding::Base64UrlSafe;
        let wire = encode_envelope(&env);
        assert!(wire["senderEncryptedPayload"].as_str().unwrap().contains('-'));

        let decoded = decode_envelope_value(wire).unwrap();
        assert_eq!(decoded.wire_format.encoding, ByteEncoding::Base64UrlSafe);
        assert_eq!(decoded.sender_bundle, env.sender_bundle);
    }

    #[test]
    fn mixed_encodings_are_rejected() {
        let mut env = sample_envelope();
        env.wire_format.encoding = ByteEncoding::Hex;
        let mut wire = encode_envelope(&env);
        let sender = env.sender_bundle.as_ref().unwrap();
        wire["senderEncryptedPayload"] = json!(ByteEncoding::Base64Standard.encode(&sender.ciphertext));
        assert!(matches!(decode_envelope_value(wire), Err(ProtoError::Encoding(_))));
    }

    #[test]
    fn invalid_from_key_is_rejected() {
        let mut wire = encode_envelope(&sample_envelope());
        wire["fromPublicKey"] = json!("not-a-key");
        assert!(matches!(
            decode_envelope_value(wire),
            Err(ProtoError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn upper_case_keys_are_kept_verbatim() {
        let mut env = sample_envelope();
        env.from_public_key = env.from_public_key.to_ascii_uppercase();
        let decoded = decode_envelope_value(encode_envelope(&env)).unwrap();
        assert_eq!(decoded.from_public_key, "AA".repeat(32));
        assert_eq!(decoded.from_key_normalized(), "aa".repeat(32));
    }
}
