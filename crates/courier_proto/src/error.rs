use thiserror::Error;

use courier_crypto::CryptoError;

#[derive(Debug, Error)]
pub enum ProtoError {
    /// No known hex/base64 variant decodes the field to the expected lengths.
    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Envelope signature verification failed")]
    SignatureVerification,

    #[error("Envelope has no bundle addressed to this identity")]
    NoBundleForIdentity,

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}
