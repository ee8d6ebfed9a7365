use thiserror::Error;

use courier_proto::{ProtoError, Status};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// The addressed principal has no published identity record.
    #[error("No published identity for {0}")]
    OrphanedIdentity(String),

    #[error("Invalid identity record: {0}")]
    InvalidIdentity(String),

    /// The record was not signed by the signing key it names.
    #[error("Identity record for {0} is not signed by its key")]
    IdentitySignature(String),

    #[error("Identity key conflict for {signing_key}: stored={stored} new={new}")]
    IdentityKeyConflict {
        signing_key: String,
        stored: String,
        new: String,
    },

    #[error("Message {id}: cannot move from {from} to {to}")]
    InvalidTransition { id: String, from: Status, to: Status },

    #[error("Envelope rejected: {0}")]
    Proto(#[from] ProtoError),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}

impl StoreError {
    /// Stable machine-readable code carried in `RelayResponse::Error`.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Database(_) | StoreError::Migration(_) => "internal",
            StoreError::NotFound(_) => "not_found",
            StoreError::Duplicate(_) => "duplicate",
            StoreError::OrphanedIdentity(_) => "orphaned_identity",
            StoreError::InvalidIdentity(_) => "invalid_identity",
            StoreError::IdentitySignature(_) => "bad_identity_signature",
            StoreError::IdentityKeyConflict { .. } => "identity_conflict",
            StoreError::InvalidTransition { .. } => "invalid_transition",
            StoreError::Proto(ProtoError::SignatureVerification) => "bad_signature",
            StoreError::Proto(ProtoError::Encoding(_)) => "bad_encoding",
            StoreError::Proto(_) => "bad_envelope",
            StoreError::Serialisation(_) => "bad_request",
        }
    }
}
