//! Byte encodings seen on the wire.
//!
//! Clients disagree: the native app emits hex, the browser emits base64 in
//! one of three flavours. Detection is deterministic:
//!
//!   1. If the ciphertext is hex-only and at least `MIN_HEX_CIPHERTEXT_CHARS`
//!      long, try hex.
//!   2. Otherwise (or if hex yields the wrong lengths) try, in order:
//!      standard padded, URL-safe padded, URL-safe unpadded base64.
//!   3. The first candidate that decodes every field to the expected
//!      structural length wins. If none does, the input is malformed.

use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD},
    Engine,
};
use serde::{Deserialize, Serialize};

use courier_crypto::aead::TAG_LEN;

use crate::error::ProtoError;

/// Shortest plausible hex ciphertext: an empty plaintext still carries the tag.
pub const MIN_HEX_CIPHERTEXT_CHARS: usize = TAG_LEN * 2;

pub const SIGNATURE_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteEncoding {
    Hex,
    Base64Standard,
    Base64UrlSafe,
    Base64UrlSafeNoPad,
}

impl ByteEncoding {
    /// Order in which base64 flavours are attempted.
    pub const BASE64_PRIORITY: [ByteEncoding; 3] = [
        ByteEncoding::Base64Standard,
        ByteEncoding::Base64UrlSafe,
        ByteEncoding::Base64UrlSafeNoPad,
    ];

    pub fn encode(&self, bytes: &[u8]) -> String {
        match self {
            ByteEncoding::Hex => hex::encode(bytes),
            ByteEncoding::Base64Standard => STANDARD.encode(bytes),
            ByteEncoding::Base64UrlSafe => URL_SAFE.encode(bytes),
            ByteEncoding::Base64UrlSafeNoPad => URL_SAFE_NO_PAD.encode(bytes),
        }
    }

    pub fn decode(&self, s: &str) -> Result<Vec<u8>, ProtoError> {
        let decoded = match self {
            ByteEncoding::Hex => hex::decode(s).map_err(|e| e.to_string()),
            ByteEncoding::Base64Standard => STANDARD.decode(s).map_err(|e| e.to_string()),
            ByteEncoding::Base64UrlSafe => URL_SAFE.decode(s).map_err(|e| e.to_string()),
            ByteEncoding::Base64UrlSafeNoPad => URL_SAFE_NO_PAD.decode(s).map_err(|e| e.to_string()),
        };
        decoded.map_err(|e| ProtoError::Encoding(format!("{self:?}: {e}")))
    }

    pub fn is_base64(&self) -> bool {
        !matches!(self, ByteEncoding::Hex)
    }
}

/// Hex-only character set with an even length.
pub fn looks_hex(s: &str) -> bool {
    !s.is_empty() && s.len() % 2 == 0 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Candidate encodings for a ciphertext string, in detection order.
pub fn candidates_for(ciphertext: &str) -> Vec<ByteEncoding> {
    let mut out = Vec::with_capacity(4);
    if looks_hex(ciphertext) && ciphertext.len() >= MIN_HEX_CIPHERTEXT_CHARS {
        out.push(ByteEncoding::Hex);
    }
    out.extend(ByteEncoding::BASE64_PRIORITY);
    out
}

/// Decode a 64-byte Ed25519 signature in whichever encoding it arrived.
///
/// The input is used verbatim: signatures are never case-normalised.
pub fn decode_signature(s: &str) -> Result<[u8; SIGNATURE_LEN], ProtoError> {
    let mut order = Vec::with_capacity(4);
    if looks_hex(s) && s.len() == SIGNATURE_LEN * 2 {
        order.push(ByteEncoding::Hex);
    }
    order.extend(ByteEncoding::BASE64_PRIORITY);

    for encoding in order {
        if let Ok(bytes) = encoding.decode(s) {
            if let Ok(sig) = <[u8; SIGNATURE_LEN]>::try_from(bytes.as_slice()) {
                return Ok(sig);
            }
        }
    }
    Err(ProtoError::Encoding("signature is not a 64-byte hex or base64 value".into()))
}
