//! Envelope signatures.
//!
//!   digest    = SHA-256(UTF-8(canonical_form(envelope without signature)))
//!   signature = Ed25519(identity_secret, digest)
//!
//! The 32-byte digest is what gets signed, not the canonical bytes.
//! The encoded signature is case-sensitive and is stored and compared
//! verbatim; only public keys are case-normalised.

use courier_crypto::{
    hash::sha256,
    identity::verify_signature,
    CryptoError, Identity, PublicKeyBytes,
};

use crate::{encoding::decode_signature, envelope::Envelope, error::ProtoError};

pub fn signing_digest(envelope: &Envelope) -> [u8; 32] {
    sha256(envelope.canonical_form().as_bytes())
}

/// Sign and return the encoded signature (encoding follows the wire format).
pub fn sign(envelope: &Envelope, identity: &Identity) -> String {
    let sig = identity.sign(&signing_digest(envelope));
    envelope.wire_format.signature_encoding().encode(&sig)
}

/// Sign in place. The identity must be the envelope's sender.
pub fn sign_envelope(envelope: &mut Envelope, identity: &Identity) -> Result<(), ProtoError> {
    if !identity.signing_public().matches_hex(&envelope.from_public_key) {
        return Err(ProtoError::Crypto(CryptoError::InvalidKey(
            "signing identity is not the envelope sender".into(),
        )));
    }
    envelope.signature = sign(envelope, identity);
    Ok(())
}

/// Check `signature` over `envelope` against an explicit identity key.
pub fn verify(envelope: &Envelope, signature: &str, identity_public: &PublicKeyBytes) -> bool {
    let Ok(sig) = decode_signature(signature) else {
        return false;
    };
    verify_signature(&identity_public.0, &signing_digest(envelope), &sig).is_ok()
}

/// Verify the envelope's own signature against its `fromPublicKey`.
///
/// Fail-closed: any decoding problem is a verification failure.
pub fn verify_envelope(envelope: &Envelope) -> Result<(), ProtoError> {
    let from = PublicKeyBytes::from_hex(&envelope.from_public_key)
        .map_err(|_| ProtoError::SignatureVerification)?;
    if verify(envelope, &envelope.signature, &from) {
        Ok(())
    } else {
        Err(ProtoError::SignatureVerification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        encoding::ByteEncoding,
        envelope::{tests::sample_envelope, WireFormat, BundleShape},
    };

    fn signed_by(identity: &Identity) -> Envelope {
        let mut env = sample_envelope();
        env.from_public_key = identity.signing_public().to_hex();
        sign_envelope(&mut env, identity).unwrap();
        env
    }

    #[test]
    fn signed_envelope_verifies() {
        let id = Identity::generate(None);
        let env = signed_by(&id);
        verify_envelope(&env).unwrap();
        assert!(verify(&env, &env.signature, id.signing_public()));
    }

    #[test]
    fn other_identity_cannot_sign_for_sender() {
        let id = Identity::generate(None);
        let other = Identity::generate(None);
        let mut env = sample_envelope();
        env.from_public_key = id.signing_public().to_hex();
        assert!(sign_envelope(&mut env, &other).is_err());
    }

    #[test]
    fn mutating_any_field_invalidates_signature() {
        let id = Identity::generate(None);
        let env = signed_by(&id);

        let mut e = env.clone();
        e.priority += 1;
        assert!(verify_envelope(&e).is_err());

        let mut e = env.clone();
        e.thread_id = Some("t".into());
        assert!(verify_envelope(&e).is_err());

        let mut e = env.clone();
        e.to_public_keys.push("cc".repeat(32));
        assert!(verify_envelope(&e).is_err());

        let mut e = env.clone();
        e.sender_bundle = None;
        assert!(verify_envelope(&e).is_err());
    }

    #[test]
    fn hex_envelopes_carry_hex_signatures() {
        let id = Identity::generate(None);
        let mut env = sample_envelope();
        env.from_public_key = id.signing_public().to_hex();
        env.wire_format = WireFormat::new(ByteEncoding::Hex, BundleShape::Flat);
        sign_envelope(&mut env, &id).unwrap();
        assert_eq!(env.signature.len(), 128);
        verify_envelope(&env).unwrap();
    }

    #[test]
    fn lower_cased_base64_signature_fails() {
        let id = Identity::generate(None);
        let mut env = signed_by(&id);
        let lowered = env.signature.to_ascii_lowercase();
        if lowered != env.signature {
            env.signature = lowered;
            assert!(verify_envelope(&env).is_err());
        }
    }

    #[test]
    fn upper_case_sender_key_still_verifies() {
        let id = Identity::generate(None);
        let mut env = sample_envelope();
        env.from_public_key = id.signing_public().to_hex().to_ascii_uppercase();
        sign_envelope(&mut env, &id).unwrap();
        verify_envelope(&env).unwrap();
    }
}
