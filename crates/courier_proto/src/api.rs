//! Relay request/response types shared between clients and the relay.
//! These map directly to JSON bodies on whatever transport fronts the relay.

use serde::{Deserialize, Serialize};

use courier_crypto::identity::PublicIdentity;

use crate::message::Status;

/// Upper bound on any page size a client may request.
pub const MAX_PAGE_LIMIT: u32 = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum RelayRequest {
    /// Store a signed envelope (wire JSON, any accepted encoding).
    Submit { envelope: serde_json::Value },

    /// Pending messages for a recipient; each returned message moves to
    /// `delivered`.
    #[serde(rename_all = "camelCase")]
    PullPending {
        recipient_key: String,
        #[serde(default)]
        since: Option<i64>,
        limit: u32,
    },

    #[serde(rename_all = "camelCase")]
    FetchConversation {
        party_a: String,
        party_b: String,
        limit: u32,
        #[serde(default)]
        before: Option<i64>,
    },

    #[serde(rename_all = "camelCase")]
    FetchThread { thread_id: String },

    /// Batch, idempotent `→ read` transition.
    #[serde(rename_all = "camelCase")]
    Acknowledge {
        recipient_key: String,
        message_ids: Vec<String>,
    },

    /// `signature` is the hex proof from `Identity::sign_record`.
    PublishIdentity { identity: PublicIdentity, signature: String },

    #[serde(rename_all = "camelCase")]
    LookupIdentity { signing_key: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum RelayResponse {
    #[serde(rename_all = "camelCase")]
    Submitted { id: String, received_at: i64, cursor: i64 },

    Messages { messages: Vec<RelayMessage> },

    Acknowledged { acked: Vec<String> },

    #[serde(rename_all = "camelCase")]
    IdentityPublished { signing_key: String },

    Identity { identity: Option<PublicIdentity> },

    Error { error: String, code: String },
}

/// An envelope as held by the relay, with its delivery status.
///
/// `envelope` is the wire JSON exactly as submitted; the relay never
/// rewrites it. `cursor` is the relay's insertion position and is what
/// `since`/`before` page on; receipt times can collide within a millisecond.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayMessage {
    pub id: String,
    pub status: Status,
    pub received_at: i64,
    pub cursor: i64,
    pub envelope: serde_json::Value,
}
