//! Reply content.

use courier_proto::{Envelope, PlaintextPayload};

/// Decides what the responder says back to an inbound message.
pub trait ReplyComposer: Send + Sync {
    fn compose(&self, inbound: &PlaintextPayload, envelope: &Envelope) -> PlaintextPayload;
}

/// Echoes the inbound text behind a fixed prefix.
#[derive(Debug, Clone)]
pub struct EchoComposer {
    prefix: String,
}

impl EchoComposer {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }
}

impl ReplyComposer for EchoComposer {
    fn compose(&self, inbound: &PlaintextPayload, envelope: &Envelope) -> PlaintextPayload {
        PlaintextPayload {
            text: format!("{}{}", self.prefix, inbound.text),
            sent_at: chrono::Utc::now().timestamp_millis(),
            reply_to: Some(envelope.id.clone()),
        }
    }
}
