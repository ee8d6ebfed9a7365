//! Plaintext payload types and relay delivery status.

use serde::{Deserialize, Serialize};

/// `payloadType` tag for a plain text message.
pub const PAYLOAD_TYPE_TEXT: &str = "text/plain";

/// Deserialised plaintext carried inside a `CipherBundle`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaintextPayload {
    pub text: String,
    /// Sender clock, epoch milliseconds.
    pub sent_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

impl PlaintextPayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sent_at: chrono::Utc::now().timestamp_millis(),
            reply_to: None,
        }
    }
}

/// Relay-side delivery state of a stored envelope.
///
///   pending ──pull──▶ delivered ──ack──▶ read
///      │ └────────────ack───────────────▲
///      └──TTL sweep──▶ expired
///
/// No transition ever returns to `Pending`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Pending,
    Delivered,
    Read,
    Expired,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Delivered => "delivered",
            Status::Read => "read",
            Status::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Status::Pending),
            "delivered" => Some(Status::Delivered),
            "read" => Some(Status::Read),
            "expired" => Some(Status::Expired),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: Status) -> bool {
        matches!(
            (self, next),
            (Status::Pending, Status::Delivered)
                | (Status::Pending, Status::Read)
                | (Status::Delivered, Status::Read)
                | (Status::Pending, Status::Expired)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Read | Status::Expired)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Status; 4] = [Status::Pending, Status::Delivered, Status::Read, Status::Expired];

    #[test]
    fn nothing_returns_to_pending() {
        for s in ALL {
            assert!(!s.can_transition_to(Status::Pending), "{s} -> pending");
        }
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for s in ALL.into_iter().filter(Status::is_terminal) {
            for next in ALL {
                assert!(!s.can_transition_to(next));
            }
        }
    }

    #[test]
    fn only_pending_expires() {
        assert!(Status::Pending.can_transition_to(Status::Expired));
        assert!(!Status::Delivered.can_transition_to(Status::Expired));
    }

    #[test]
    fn status_string_roundtrip() {
        for s in ALL {
            assert_eq!(Status::parse(s.as_str()), Some(s));
        }
        assert_eq!(Status::parse("failed"), None);
    }

    #[test]
    fn payload_omits_absent_reply_to() {
        let p = PlaintextPayload {
            text: "hello".into(),
            sent_at: 1,
            reply_to: None,
        };
        assert_eq!(serde_json::to_string(&p).unwrap(), r#"{"text":"hello","sentAt":1}"#);
    }
}
