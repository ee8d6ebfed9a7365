//! Reference responder.
//!
//!   idle ──tick──▶ polling ──▶ processing batch ──▶ idle
//!
//! Per inbound message:
//!   1. skip anything the responder authored itself
//!   2. decode (all wire variants) and verify the signature
//!   3. open the bundle addressed to the responder
//!   4. look up the sender's published encryption key, compose a dual-sealed
//!      signed reply in the sender's own wire format, submit it
//!   5. mark the inbound message delivered
//!
//! A sender with no directory record can never be answered; its message is
//! marked delivered so it is not retried forever. Messages that cannot be
//! decoded, verified or opened stay `pending` on the relay (there is no
//! `failed` state) and are remembered here so the same bytes are never
//! processed twice by this process. A sender whose record lacks an
//! encryption key is not remembered: the next batch retries once the key is
//! published.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use courier_crypto::{identity::PublicIdentity, CryptoError, Identity};
use courier_proto::{
    api::{RelayMessage, MAX_PAGE_LIMIT},
    compose_envelope, decode_envelope_value, open_envelope,
    signing::verify_envelope, ComposeOptions, ProtoError,
};
use courier_store::{Store, StoreError};

use crate::{error::ResponderError, reply::ReplyComposer};

/// Why a message was left `pending` without a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// `fromPublicKey` is the responder's own signing key.
    SelfAuthored,
    /// No hex/base64 variant decodes the envelope.
    Undecodable,
    BadSignature,
    /// AEAD authentication failed, or the plaintext is not a payload we read.
    DecryptFailed,
    /// No bundle in the envelope is sealed for the responder.
    NotAddressed,
    /// The sender published no encryption key yet. Retried every batch.
    NoEncryptionKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Replied { reply_id: String },
    /// Sender has no directory record; marked delivered without a reply.
    Orphaned,
    Skipped(SkipReason),
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<(String, Outcome)>,
}

impl BatchReport {
    pub fn replied(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, Outcome::Replied { .. }))
            .count()
    }

    pub fn outcome_of(&self, id: &str) -> Option<&Outcome> {
        self.outcomes.iter().find(|(m, _)| m == id).map(|(_, o)| o)
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Clears the in-flight flag when a batch ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Responder {
    store: Store,
    identity: Identity,
    composer: Box<dyn ReplyComposer>,
    batch_size: u32,
    skipped: Mutex<HashMap<String, SkipReason>>,
    in_flight: AtomicBool,
}

impl Responder {
    pub fn new(
        store: Store,
        identity: Identity,
        composer: impl ReplyComposer + 'static,
        batch_size: u32,
    ) -> Self {
        Self {
            store,
            identity,
            composer: Box::new(composer),
            batch_size: batch_size.max(1),
            skipped: Mutex::new(HashMap::new()),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Publish the responder's public keys so senders can seal to it.
    pub async fn publish_identity(&self) -> Result<PublicIdentity, ResponderError> {
        let record = self.identity.public_record();
        let signature = self.identity.sign_record(&record)?;
        Ok(self.store.publish_identity(&record, &signature).await?)
    }

    pub fn skip_reason(&self, message_id: &str) -> Option<SkipReason> {
        self.skipped.lock().get(message_id).copied()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.lock().len()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// TTL sweep over the whole relay.
    pub async fn sweep(&self) -> Result<u64, ResponderError> {
        Ok(self.store.sweep_expired(chrono::Utc::now().timestamp_millis()).await?)
    }

    // ── Batches ──────────────────────────────────────────────────────────────

    /// Run one batch unless another is already in flight.
    ///
    /// Returns `Ok(None)` when the call was skipped.
    pub async fn run_batch(&self) -> Result<Option<BatchReport>, ResponderError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("batch already in flight; skipping");
            return Ok(None);
        }
        let _guard = InFlight(&self.in_flight);
        self.process_batch().await.map(Some)
    }

    async fn process_batch(&self) -> Result<BatchReport, ResponderError> {
        let own_key = self.identity.signing_public().to_hex();
        let batch_size = self.batch_size as usize;
        let page_size = self.batch_size.min(MAX_PAGE_LIMIT);
        let mut report = BatchReport::default();

        // Remembered skips stay pending on the relay; page forward past them.
        let mut cursor = None;
        'pages: loop {
            let page = self.store.pull_pending(&own_key, cursor, page_size).await?;
            let exhausted = page.len() < page_size as usize;
            for msg in page {
                if report.outcomes.len() >= batch_size {
                    break 'pages;
                }
                cursor = Some(msg.cursor);
                if self.skipped.lock().contains_key(&msg.id) {
                    continue;
                }
                match self.process_message(&msg).await {
                    Ok(outcome) => report.outcomes.push((msg.id, outcome)),
                    Err(e) => {
                        error!(message_id = %msg.id, error = %e, "message processing failed; will retry");
                    }
                }
            }
            if exhausted {
                break;
            }
        }

        if !report.is_empty() {
            info!(
                processed = report.outcomes.len(),
                replied = report.replied(),
                "batch complete"
            );
        }
        Ok(report)
    }

    // ── Single message ───────────────────────────────────────────────────────

    pub async fn process_message(&self, msg: &RelayMessage) -> Result<Outcome, ResponderError> {
        let from = msg
            .envelope
            .get("fromPublicKey")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if self.identity.signing_public().matches_hex(from) {
            return Ok(self.skip(&msg.id, SkipReason::SelfAuthored));
        }

        let envelope = match decode_envelope_value(msg.envelope.clone()) {
            Ok(env) => env,
            Err(e) => {
                warn!(message_id = %msg.id, error = %e, "envelope matches no known encoding");
                return Ok(self.skip(&msg.id, SkipReason::Undecodable));
            }
        };
        if verify_envelope(&envelope).is_err() {
            warn!(message_id = %msg.id, "envelope signature invalid");
            return Ok(self.skip(&msg.id, SkipReason::BadSignature));
        }

        let inbound = match open_envelope(&envelope, &self.identity) {
            Ok(p) => p,
            Err(ProtoError::NoBundleForIdentity) => {
                return Ok(self.skip(&msg.id, SkipReason::NotAddressed));
            }
            Err(e) => {
                warn!(message_id = %msg.id, error = %e, "bundle could not be opened");
                return Ok(self.skip(&msg.id, SkipReason::DecryptFailed));
            }
        };

        let sender = match self.store.require_identity(&envelope.from_public_key).await {
            Ok(record) => record,
            Err(StoreError::OrphanedIdentity(key)) => {
                warn!(message_id = %msg.id, sender = %short(&key), "sender has no published identity");
                self.finish(&msg.id).await?;
                return Ok(Outcome::Orphaned);
            }
            Err(e) => return Err(e.into()),
        };

        let payload = self.composer.compose(&inbound, &envelope);
        let opts = ComposeOptions {
            thread_id: Some(envelope.thread_id.clone().unwrap_or_else(|| envelope.id.clone())),
            reply_to_id: Some(envelope.id.clone()),
            wire_format: envelope.wire_format,
            ..ComposeOptions::default()
        };
        let reply = match compose_envelope(&self.identity, &sender, &payload, opts) {
            Ok(reply) => reply,
            Err(ProtoError::Crypto(CryptoError::MissingEncryptionKey(_))) => {
                warn!(message_id = %msg.id, sender = %short(&sender.signing_key), "sender published no encryption key");
                return Ok(Outcome::Skipped(SkipReason::NoEncryptionKey));
            }
            Err(e) => return Err(e.into()),
        };

        self.store.submit_envelope(&reply).await?;
        self.finish(&msg.id).await?;
        info!(message_id = %msg.id, reply_id = %reply.id, "replied");
        Ok(Outcome::Replied { reply_id: reply.id })
    }

    fn skip(&self, message_id: &str, reason: SkipReason) -> Outcome {
        self.skipped.lock().insert(message_id.to_string(), reason);
        debug!(message_id = %message_id, ?reason, "left pending");
        Outcome::Skipped(reason)
    }

    /// Mark delivered; losing the race to another consumer is not an error.
    async fn finish(&self, message_id: &str) -> Result<(), ResponderError> {
        match self.store.mark_delivered(message_id).await {
            Ok(true) => Ok(()),
            Ok(false) | Err(StoreError::InvalidTransition { .. }) => {
                debug!(message_id = %message_id, "already advanced by another consumer");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn short(key: &str) -> &str {
    key.get(..8).unwrap_or(key)
}
