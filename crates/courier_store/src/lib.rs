//! courier_store — store-and-forward relay persistence for Courier
//!
//! # What the relay sees
//! The relay stores signed envelopes as opaque wire JSON. It reads only the
//! routing metadata (sender, recipients, thread, expiry) and never holds a
//! private key. Submissions are decoded and signature-checked before they are
//! persisted; the stored JSON is the submitted JSON, byte for byte.
//!
//! # Delivery status
//! Every mutation of `status` is a conditional `UPDATE` guarded by the states
//! it may leave, so racing consumers advance a message at most once.
//!
//! # Migration
//! SQLx migrations in `migrations/` are run on open.

pub mod db;
pub mod directory;
pub mod error;
pub mod models;
pub mod relay;
pub mod service;

pub use db::Store;
pub use error::StoreError;
