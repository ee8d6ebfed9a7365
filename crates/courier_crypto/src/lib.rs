//! courier_crypto — identity keys and envelope sealing for Courier
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Signing (Ed25519) and encryption (X25519) keys are independent; no key
//!   type is ever converted into the other.
//! - Zeroize secret material on drop.
//!
//! # Module layout
//! - `identity` — Ed25519 signing keypair + X25519 encryption keypair
//! - `seal`     — ephemeral-static X25519 sealing into a `CipherBundle`
//! - `aead`     — ChaCha20-Poly1305 with an explicit 12-byte nonce
//! - `kdf`      — HKDF-SHA256
//! - `hash`     — SHA-256 helpers
//! - `error`    — unified error type

pub mod aead;
pub mod error;
pub mod hash;
pub mod identity;
pub mod kdf;
pub mod seal;

pub use error::CryptoError;
pub use identity::{Identity, PublicKeyBytes};
pub use seal::{open, seal, seal_dual, CipherBundle, DualSealed};
