//! The wire message envelope.
//!
//! Every frame on the socket is a JSON object of this shape. The `type`
//! field is an open string convention rather than a closed enum: the server
//! emits per-entity topics (`lead_updated`, `kpi_updated`, ...) that the
//! core routes without knowing the full set in advance.

use crate::{MessageId, OrgId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single message on the socket, in either direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    /// Message type, e.g. `heartbeat`, `ack`, `subscribe`, `lead_updated`.
    #[serde(rename = "type")]
    pub msg_type: String,

    /// Type-specific payload. Kept opaque at the envelope level.
    pub payload: serde_json::Value,

    /// When the sender produced the message.
    pub timestamp: DateTime<Utc>,

    /// Unique per message; acknowledgments echo the id of the message they
    /// confirm.
    pub message_id: MessageId,

    /// Originating organization, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<OrgId>,

    /// Originating user, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

impl WireMessage {
    /// Creates a message with a fresh id and the current timestamp.
    #[must_use]
    pub fn new(msg_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            msg_type: msg_type.into(),
            payload,
            timestamp: Utc::now(),
            message_id: MessageId::new(),
            organization_id: None,
            user_id: None,
        }
    }

    /// Stamps the sender's identity onto the message.
    #[must_use]
    pub fn with_identity(mut self, organization_id: OrgId, user_id: UserId) -> Self {
        self.organization_id = Some(organization_id);
        self.user_id = Some(user_id);
        self
    }

    /// Creates an acknowledgment for this message, echoing its id.
    #[must_use]
    pub fn ack_with(&self, payload: serde_json::Value) -> Self {
        Self {
            msg_type: "ack".to_string(),
            payload,
            timestamp: Utc::now(),
            message_id: self.message_id,
            organization_id: self.organization_id,
            user_id: self.user_id,
        }
    }
}
