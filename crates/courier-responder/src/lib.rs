//! courier-responder — the protocol's own conformance client.
//!
//! Polls the relay for envelopes addressed to its identity, opens them and
//! answers each with a signed, dual-sealed reply to the original sender.
//!
//! # Modules
//! - `config`    — JSON config file + environment key material
//! - `reply`     — what to say back (`ReplyComposer`)
//! - `responder` — per-message pipeline and single-flight batches
//! - `poll_loop` — fixed-interval scheduler with wake and graceful drain

pub mod config;
pub mod error;
pub mod poll_loop;
pub mod reply;
pub mod responder;

pub use config::ResponderConfig;
pub use error::ResponderError;
pub use reply::{EchoComposer, ReplyComposer};
pub use responder::{BatchReport, Outcome, Responder, SkipReason};
