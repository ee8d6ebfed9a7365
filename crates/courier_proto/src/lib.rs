//! courier_proto — wire envelope, canonical form and signatures for Courier
//!
//! Every client (native, browser, server) must produce bit-identical
//! signature inputs, so the canonical form is derived from a typed model with
//! a fixed field list rather than from whatever JSON a client happened to emit.
//!
//! # Modules
//! - `envelope`  — typed `Envelope` + the wire format it was read in
//! - `encoding`  — hex / base64 variants and their detection order
//! - `codec`     — wire JSON <-> `Envelope` (flat/nested, hex/base64)
//! - `canonical` — sorted, null-excluding, whitespace-free serialisation
//! - `signing`   — SHA-256 + Ed25519 over the canonical form
//! - `compose`   — seal + assemble + sign, and the matching open
//! - `message`   — plaintext payload and relay delivery `Status`
//! - `api`       — transport-agnostic relay request/response types

pub mod api;
pub mod canonical;
pub mod codec;
pub mod compose;
pub mod encoding;
pub mod envelope;
pub mod error;
pub mod message;
pub mod signing;

pub use codec::{decode_envelope, decode_envelope_value, encode_envelope};
pub use compose::{compose_envelope, open_envelope, ComposeOptions};
pub use encoding::ByteEncoding;
pub use envelope::{BundleShape, Envelope, WireFormat, ENVELOPE_VERSION};
pub use error::ProtoError;
pub use message::{PlaintextPayload, Status, PAYLOAD_TYPE_TEXT};
