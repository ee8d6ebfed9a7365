//! Sender and receiver halves of the envelope pipeline.
//!
//!   plaintext → seal_dual → assemble → canonical form → sign
//!   envelope  → pick own bundle → open → plaintext

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use courier_crypto::{
    identity::{normalize_key_hex, PublicIdentity},
    seal, Identity,
};

use crate::{
    envelope::{Envelope, WireFormat, ENVELOPE_VERSION},
    error::ProtoError,
    message::{PlaintextPayload, PAYLOAD_TYPE_TEXT},
    signing,
};

#[derive(Debug, Clone)]
pub struct ComposeOptions {
    pub thread_id: Option<String>,
    pub reply_to_id: Option<String>,
    pub forward_of_id: Option<String>,
    pub expires_at: Option<i64>,
    pub priority: i32,
    /// Seal a copy for the sender's own encryption key.
    pub sender_copy: bool,
    pub wire_format: WireFormat,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            thread_id: None,
            reply_to_id: None,
            forward_of_id: None,
            expires_at: None,
            priority: 0,
            sender_copy: true,
            wire_format: WireFormat::default(),
        }
    }
}

/// Seal, assemble and sign a new envelope for `recipient`.
///
/// Fails with `MissingEncryptionKey` before any ciphertext exists when the
/// recipient never published an encryption key.
pub fn compose_envelope(
    sender: &Identity,
    recipient: &PublicIdentity,
    payload: &PlaintextPayload,
    opts: ComposeOptions,
) -> Result<Envelope, ProtoError> {
    let recipient_key = recipient.encryption_key_bytes()?;
    let plaintext = zeroize::Zeroizing::new(serde_json::to_vec(payload)?);

    let own_key = opts.sender_copy.then(|| *sender.encryption_public());
    let sealed = seal::seal_dual(&plaintext, &recipient_key, own_key.as_ref())?;

    let mut envelope = Envelope {
        id: Uuid::new_v4().to_string(),
        version: ENVELOPE_VERSION,
        from_public_key: sender.signing_public().to_hex(),
        to_public_keys: vec![normalize_key_hex(&recipient.signing_key)],
        payload_type: PAYLOAD_TYPE_TEXT.to_string(),
        recipient_bundle: sealed.recipient,
        sender_bundle: sealed.sender,
        payload_size: plaintext.len() as u64,
        thread_id: opts.thread_id,
        reply_to_id: opts.reply_to_id,
        forward_of_id: opts.forward_of_id,
        timestamp: Utc::now().timestamp_millis(),
        expires_at: opts.expires_at,
        priority: opts.priority,
        signature: String::new(),
        wire_format: opts.wire_format,
    };
    signing::sign_envelope(&mut envelope, sender)?;
    Ok(envelope)
}

/// Open whichever bundle belongs to `own`: the sender copy when `own`
/// authored the envelope, the recipient bundle otherwise.
pub fn open_envelope(envelope: &Envelope, own: &Identity) -> Result<PlaintextPayload, ProtoError> {
    let own_key = own.signing_public().to_hex();
    let bundle = if envelope.is_from(&own_key) {
        envelope.sender_bundle.as_ref().ok_or(ProtoError::NoBundleForIdentity)?
    } else if envelope.is_addressed_to(&own_key) {
        &envelope.recipient_bundle
    } else {
        return Err(ProtoError::NoBundleForIdentity);
    };

    let plaintext = seal::open(bundle, own)?;
    // Advisory only.
    if plaintext.len() as u64 != envelope.payload_size {
        warn!(
            envelope_id = %envelope.id,
            payload_size = envelope.payload_size,
            plaintext_len = plaintext.len(),
            "payloadSize does not match decrypted length"
        );
    }
    Ok(serde_json::from_slice(&plaintext)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::verify_envelope;
    use courier_crypto::CryptoError;

    #[test]
    fn basic_dual_send() {
        let alice = Identity::generate(Some("alice".into()));
        let bob = Identity::generate(Some("bob".into()));
        let env = compose_envelope(
            &alice,
            &bob.public_record(),
            &PlaintextPayload::text("hello"),
            ComposeOptions::default(),
        )
        .unwrap();

        verify_envelope(&env).unwrap();
        assert!(env.sender_bundle.is_some());
        assert_eq!(open_envelope(&env, &bob).unwrap().text, "hello");
        assert_eq!(open_envelope(&env, &alice).unwrap().text, "hello");
    }

    #[test]
    fn third_party_has_no_bundle() {
        let alice = Identity::generate(None);
        let bob = Identity::generate(None);
        let eve = Identity::generate(None);
        let env = compose_envelope(
            &alice,
            &bob.public_record(),
            &PlaintextPayload::text("hi"),
            ComposeOptions::default(),
        )
        .unwrap();
        assert!(matches!(open_envelope(&env, &eve), Err(ProtoError::NoBundleForIdentity)));
    }

    #[test]
    fn missing_recipient_encryption_key_fails_before_sealing() {
        let alice = Identity::generate(None);
        let mut record = Identity::generate(None).public_record();
        record.encryption_key = None;
        let err = compose_envelope(&alice, &record, &PlaintextPayload::text("x"), ComposeOptions::default())
            .unwrap_err();
        assert!(matches!(err, ProtoError::Crypto(CryptoError::MissingEncryptionKey(_))));
    }

    #[test]
    fn without_sender_copy_the_author_cannot_reopen() {
        let alice = Identity::generate(None);
        let bob = Identity::generate(None);
        let opts = ComposeOptions {
            sender_copy: false,
            ..ComposeOptions::default()
        };
        let env = compose_envelope(&alice, &bob.public_record(), &PlaintextPayload::text("x"), opts).unwrap();
        assert!(env.sender_bundle.is_none());
        verify_envelope(&env).unwrap();
        assert!(matches!(open_envelope(&env, &alice), Err(ProtoError::NoBundleForIdentity)));
    }

    #[test]
    fn payload_size_is_plaintext_length() {
        let alice = Identity::generate(None);
        let bob = Identity::generate(None);
        let payload = PlaintextPayload::text("hello");
        let env = compose_envelope(&alice, &bob.public_record(), &payload, ComposeOptions::default()).unwrap();
        assert_eq!(env.payload_size, serde_json::to_vec(&payload).unwrap().len() as u64);
        assert_eq!(env.payload_size as usize, env.recipient_bundle.plaintext_len());
    }

    #[test]
    fn mismatched_payload_size_still_opens() {
        let alice = Identity::generate(None);
        let bob = Identity::generate(None);
        let payload = PlaintextPayload::text("sized differently");
        let mut env =
            compose_envelope(&alice, &bob.public_record(), &payload, ComposeOptions::default()).unwrap();
        env.payload_size += 7;
        signing::sign_envelope(&mut env, &alice).unwrap();
        verify_envelope(&env).unwrap();

        assert_eq!(open_envelope(&env, &bob).unwrap(), payload);
    }
}
