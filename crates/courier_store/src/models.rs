//! Database row models — these map to/from SQL rows.

use serde::{Deserialize, Serialize};

use courier_crypto::identity::PublicIdentity;
use courier_proto::{api::RelayMessage, Status};

use crate::error::StoreError;

/// Column list shared by every `relay_messages` query.
pub(crate) const MESSAGE_COLUMNS: &str = "m.seq, m.id, m.from_key, m.thread_id, m.envelope_json, \
     m.status, m.created_at, m.expires_at, m.delivered_at, m.read_at";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RelayMessageRow {
    /// Insertion order; exposed to clients as the paging cursor.
    pub seq: i64,
    pub id: String,
    /// Lower-cased hex signing key of the sender.
    pub from_key: String,
    pub thread_id: Option<String>,
    /// Wire JSON as submitted.
    pub envelope_json: String,
    pub status: String,
    /// Relay receipt time.
    pub created_at: i64,
    pub expires_at: Option<i64>,
    pub delivered_at: Option<i64>,
    pub read_at: Option<i64>,
}

impl RelayMessageRow {
    pub fn status(&self) -> Result<Status, StoreError> {
        Status::parse(&self.status).ok_or_else(|| {
            StoreError::Database(sqlx::Error::Decode(
                format!("unknown status '{}' on {}", self.status, self.id).into(),
            ))
        })
    }

    pub fn into_message(self) -> Result<RelayMessage, StoreError> {
        let status = self.status()?;
        Ok(RelayMessage {
            envelope: serde_json::from_str(&self.envelope_json)?,
            id: self.id,
            status,
            received_at: self.created_at,
            cursor: self.seq,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct IdentityRow {
    /// Lower-cased hex Ed25519 key.
    pub signing_key: String,
    /// Lower-cased hex X25519 key; absent on records from older clients.
    pub encryption_key: Option<String>,
    pub alias: Option<String>,
    pub published_at: i64,
    pub updated_at: i64,
}

impl From<IdentityRow> for PublicIdentity {
    fn from(row: IdentityRow) -> Self {
        PublicIdentity {
            signing_key: row.signing_key,
            encryption_key: row.encryption_key,
            alias: row.alias,
        }
    }
}

pub(crate) fn rows_to_messages(rows: Vec<RelayMessageRow>) -> Result<Vec<RelayMessage>, StoreError> {
    rows.into_iter().map(RelayMessageRow::into_message).collect()
}
