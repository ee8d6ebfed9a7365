use thiserror::Error;

use courier_crypto::CryptoError;
use courier_proto::ProtoError;
use courier_store::StoreError;

#[derive(Debug, Error)]
pub enum ResponderError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("Key material error: {0}")]
    Key(#[from] CryptoError),

    #[error("Envelope error: {0}")]
    Proto(#[from] ProtoError),

    #[error("Relay error: {0}")]
    Store(#[from] StoreError),
}
