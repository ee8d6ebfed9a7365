//! Relay queue — submission, per-recipient pending inbox, status machine and
//! history queries.
//!
//!   pending ──pull/mark──▶ delivered ──ack──▶ read
//!      │ └─────────────────ack──────────────▲
//!      └──TTL sweep──▶ expired
//!
//! Status changes are single-statement conditional updates. Nothing here reads
//! a row, decides, then writes it back.

use serde_json::Value;
use tracing::{debug, info, warn};

use courier_crypto::identity::normalize_key_hex;
use courier_proto::{
    api::{RelayMessage, MAX_PAGE_LIMIT},
    decode_envelope_value, encode_envelope,
    signing::verify_envelope,
    Envelope, Status,
};

use crate::{
    db::{now_ms, short, Store},
    error::StoreError,
    models::{rows_to_messages, RelayMessageRow, MESSAGE_COLUMNS},
};

fn page_limit(limit: u32) -> i64 {
    i64::from(limit.min(MAX_PAGE_LIMIT))
}

impl Store {
    // ── Submission ───────────────────────────────────────────────────────────

    /// Validate and persist a wire envelope with status `pending`.
    ///
    /// The envelope must decode under one of the accepted encodings and carry
    /// a valid signature from `fromPublicKey`; otherwise nothing is stored.
    pub async fn submit(&self, wire: Value) -> Result<RelayMessage, StoreError> {
        let envelope = decode_envelope_value(wire.clone())?;
        verify_envelope(&envelope)?;
        self.insert_envelope(&envelope, wire.to_string()).await
    }

    /// Persist a locally composed envelope in its own wire format.
    pub async fn submit_envelope(&self, envelope: &Envelope) -> Result<RelayMessage, StoreError> {
        self.submit(encode_envelope(envelope)).await
    }

    async fn insert_envelope(
        &self,
        envelope: &Envelope,
        envelope_json: String,
    ) -> Result<RelayMessage, StoreError> {
        let received_at = now_ms();
        let from_key = envelope.from_key_normalized();
        let mut recipients = envelope.to_keys_normalized();
        recipients.sort();
        recipients.dedup();

        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            "INSERT INTO relay_messages (id, from_key, thread_id, envelope_json, status, created_at, expires_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&envelope.id)
        .bind(&from_key)
        .bind(envelope.thread_id.as_deref())
        .bind(&envelope_json)
        .bind(Status::Pending.as_str())
        .bind(received_at)
        .bind(envelope.expires_at)
        .execute(&mut *tx)
        .await;
        let cursor = match inserted {
            Ok(done) => done.last_insert_rowid(),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(StoreError::Duplicate(envelope.id.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        for key in &recipients {
            sqlx::query("INSERT OR IGNORE INTO relay_recipients (message_id, recipient_key) VALUES (?, ?)")
                .bind(&envelope.id)
                .bind(key)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        info!(
            message_id = %envelope.id,
            from = %short(&from_key),
            recipients = recipients.len(),
            "envelope stored"
        );

        Ok(RelayMessage {
            id: envelope.id.clone(),
            status: Status::Pending,
            received_at,
            cursor,
            envelope: serde_json::from_str(&envelope_json)?,
        })
    }

    // ── Pending inbox ────────────────────────────────────────────────────────

    /// Pending, unexpired messages addressed to `recipient_key`, oldest first.
    ///
    /// `since` is an exclusive lower bound on the relay cursor. Reading does
    /// not change status.
    pub async fn pull_pending(
        &self,
        recipient_key: &str,
        since: Option<i64>,
        limit: u32,
    ) -> Result<Vec<RelayMessage>, StoreError> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM relay_messages m \
             JOIN relay_recipients r ON r.message_id = m.id \
             WHERE r.recipient_key = ?1 \
               AND m.status = 'pending' \
               AND (m.expires_at IS NULL OR m.expires_at > ?2) \
               AND (?3 IS NULL OR m.seq > ?3) \
             ORDER BY m.seq ASC \
             LIMIT ?4"
        );
        let rows: Vec<RelayMessageRow> = sqlx::query_as(&sql)
            .bind(normalize_key_hex(recipient_key))
            .bind(now_ms())
            .bind(since)
            .bind(page_limit(limit))
            .fetch_all(&self.pool)
            .await?;
        rows_to_messages(rows)
    }

    /// Pull and move each returned message `pending -> delivered`.
    ///
    /// Only messages this call actually advanced are returned, so two
    /// consumers racing on the same inbox never both receive a message.
    pub async fn deliver_pending(
        &self,
        recipient_key: &str,
        since: Option<i64>,
        limit: u32,
    ) -> Result<Vec<RelayMessage>, StoreError> {
        let pending = self.pull_pending(recipient_key, since, limit).await?;
        let mut delivered = Vec::with_capacity(pending.len());
        for mut msg in pending {
            if self.advance_to_delivered(&msg.id).await? {
                msg.status = Status::Delivered;
                delivered.push(msg);
            }
        }
        debug!(
            recipient = %short(&normalize_key_hex(recipient_key)),
            count = delivered.len(),
            "pending messages delivered"
        );
        Ok(delivered)
    }

    // ── Status transitions ───────────────────────────────────────────────────

    async fn advance_to_delivered(&self, id: &str) -> Result<bool, StoreError> {
        let res = sqlx::query(
            "UPDATE relay_messages SET status = 'delivered', delivered_at = ? \
             WHERE id = ? AND status = 'pending'",
        )
        .bind(now_ms())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    /// `pending -> delivered` for one message.
    ///
    /// Returns `Ok(true)` if this call advanced it and `Ok(false)` if it was
    /// already delivered. A read or expired message cannot be moved back.
    pub async fn mark_delivered(&self, id: &str) -> Result<bool, StoreError> {
        if self.advance_to_delivered(id).await? {
            debug!(message_id = %id, "marked delivered");
            return Ok(true);
        }
        match self.status_of(id).await? {
            None => Err(StoreError::NotFound(format!("message {id}"))),
            Some(Status::Delivered) => Ok(false),
            Some(from) => Err(StoreError::InvalidTransition {
                id: id.to_string(),
                from,
                to: Status::Delivered,
            }),
        }
    }

    /// Batch `pending|delivered -> read`, scoped to messages addressed to
    /// `recipient_key`.
    ///
    /// Idempotent: ids already read, expired, unknown or addressed to someone
    /// else are ignored. Returns the ids this call advanced.
    pub async fn acknowledge(
        &self,
        recipient_key: &str,
        message_ids: &[String],
    ) -> Result<Vec<String>, StoreError> {
        let recipient = normalize_key_hex(recipient_key);
        let now = now_ms();
        let mut acked = Vec::new();
        for id in message_ids {
            let res = sqlx::query(
                "UPDATE relay_messages SET status = 'read', read_at = ? \
                 WHERE id = ? AND status IN ('pending', 'delivered') \
                   AND EXISTS (SELECT 1 FROM relay_recipients r \
                               WHERE r.message_id = relay_messages.id AND r.recipient_key = ?)",
            )
            .bind(now)
            .bind(id)
            .bind(&recipient)
            .execute(&self.pool)
            .await?;
            if res.rows_affected() == 1 {
                acked.push(id.clone());
            }
        }
        if acked.len() < message_ids.len() {
            debug!(
                requested = message_ids.len(),
                acked = acked.len(),
                "acknowledge ignored ids already read or not addressed to caller"
            );
        }
        Ok(acked)
    }

    /// `pending -> expired` for every message whose `expiresAt <= now_ms`.
    pub async fn sweep_expired(&self, now_ms: i64) -> Result<u64, StoreError> {
        let res = sqlx::query(
            "UPDATE relay_messages SET status = 'expired' \
             WHERE status = 'pending' AND expires_at IS NOT NULL AND expires_at <= ?",
        )
        .bind(now_ms)
        .execute(&self.pool)
        .await?;
        let swept = res.rows_affected();
        if swept > 0 {
            info!(count = swept, "expired pending messages");
        }
        Ok(swept)
    }

    // ── Lookups ──────────────────────────────────────────────────────────────

    pub async fn get_message(&self, id: &str) -> Result<Option<RelayMessage>, StoreError> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM relay_messages m WHERE m.id = ?");
        let row: Option<RelayMessageRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(RelayMessageRow::into_message).transpose()
    }

    pub async fn status_of(&self, id: &str) -> Result<Option<Status>, StoreError> {
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM relay_messages WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match status {
            None => Ok(None),
            Some(s) => Status::parse(&s).map(Some).ok_or_else(|| {
                warn!(message_id = %id, status = %s, "unknown status in relay_messages");
                StoreError::Database(sqlx::Error::Decode(format!("unknown status '{s}'").into()))
            }),
        }
    }

    /// Messages exchanged between two parties in either direction, in
    /// chronological order.
    ///
    /// Pages backwards from `before` (exclusive cursor): the newest
    /// `limit` messages are selected, then returned oldest first.
    pub async fn fetch_conversation(
        &self,
        party_a: &str,
        party_b: &str,
        limit: u32,
        before: Option<i64>,
    ) -> Result<Vec<RelayMessage>, StoreError> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM relay_messages m \
             WHERE ((m.from_key = ?1 AND EXISTS (SELECT 1 FROM relay_recipients r \
                                                 WHERE r.message_id = m.id AND r.recipient_key = ?2)) \
                 OR (m.from_key = ?2 AND EXISTS (SELECT 1 FROM relay_recipients r \
                                                 WHERE r.message_id = m.id AND r.recipient_key = ?1))) \
               AND (?3 IS NULL OR m.seq < ?3) \
             ORDER BY m.seq DESC \
             LIMIT ?4"
        );
        let mut rows: Vec<RelayMessageRow> = sqlx::query_as(&sql)
            .bind(normalize_key_hex(party_a))
            .bind(normalize_key_hex(party_b))
            .bind(before)
            .bind(page_limit(limit))
            .fetch_all(&self.pool)
            .await?;
        rows.reverse();
        rows_to_messages(rows)
    }

    /// Every message in a thread, including its root, oldest first.
    pub async fn fetch_thread(&self, thread_id: &str) -> Result<Vec<RelayMessage>, StoreError> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM relay_messages m \
             WHERE m.thread_id = ?1 OR m.id = ?1 \
             ORDER BY m.seq ASC"
        );
        let rows: Vec<RelayMessageRow> = sqlx::query_as(&sql)
            .bind(thread_id)
            .fetch_all(&self.pool)
            .await?;
        rows_to_messages(rows)
    }
}
