//! Wire protocol conventions over the [`WireMessage`] envelope.
//!
//! The socket protocol is a loose JSON convention rather than a closed
//! enum: a handful of reserved message types (heartbeats, acks,
//! subscriptions, entity updates), plus per-entity broadcast topics
//! following the `<entityType>_updated` naming scheme.

use drift_types::{ActionId, EntitySnapshot, FieldMap, FieldValue, WireMessage};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Liveness probe, sent on a fixed interval while connected.
pub const HEARTBEAT: &str = "heartbeat";
/// Reply to a heartbeat; refreshes the liveness stamp, never forwarded.
pub const HEARTBEAT_RESPONSE: &str = "heartbeat_response";
/// Acknowledgment of a confirmed send; correlates by echoed message id.
pub const ACK: &str = "ack";
/// Subscription request for remote change topics; requires an ack.
pub const SUBSCRIBE: &str = "subscribe";
/// A mutation pushed from client to server; requires an ack.
pub const ENTITY_UPDATE: &str = "entity_update";

/// Suffix of per-entity broadcast topics (`lead_updated`, ...).
pub const UPDATED_SUFFIX: &str = "_updated";

/// Ack payload status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    /// The message was accepted and applied.
    Ok,
    /// The targeted entity has moved past the client's assumed version;
    /// the ack carries the server's current snapshot.
    Conflict,
    /// The message was rejected.
    Error,
}

/// Payload of an `ack` message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckPayload {
    /// Outcome of the acknowledged message.
    pub status: AckStatus,
    /// Server-side error description when `status` is `Error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The server's current snapshot when `status` is `Conflict`, and the
    /// entity's committed snapshot on a successful `entity_update`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<EntitySnapshot>,
}

impl AckPayload {
    /// Parses the payload of an ack message.
    pub fn from_message(message: &WireMessage) -> Result<Self, serde_json::Error> {
        serde_json::from_value(message.payload.clone())
    }
}

/// Payload of a `subscribe` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribePayload {
    /// Topics to subscribe to, e.g. `["lead_updated", "kpi_updated"]`.
    pub event_types: Vec<String>,
}

/// Payload of an `entity_update` message (client → server mutation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityUpdatePayload {
    /// Entity type being mutated.
    pub entity_type: String,
    /// Entity id being mutated.
    pub entity_id: String,
    /// The mutated fields.
    pub data: FieldMap,
    /// The entity version the client assumed.
    pub base_version: u64,
    /// The queued action this send replays, for server-side idempotence.
    pub action_id: ActionId,
}

/// An entity update broadcast parsed out of a `<entityType>_updated`
/// message.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityUpdate {
    /// Entity type, from the message type prefix.
    pub entity_type: String,
    /// Entity id, from the payload's `id` field.
    pub entity_id: String,
    /// Scalar fields extracted from the payload (the `id` key excluded).
    pub data: FieldMap,
    /// Server version, when the payload carries one.
    pub version: Option<u64>,
}

/// Parses a realtime broadcast if the message follows the
/// `<entityType>_updated` convention and carries an `id`. Returns `None`
/// for everything else.
#[must_use]
pub fn parse_entity_update(message: &WireMessage) -> Option<EntityUpdate> {
    let entity_type = message.msg_type.strip_suffix(UPDATED_SUFFIX)?;
    if entity_type.is_empty() {
        return None;
    }
    let object = message.payload.as_object()?;
    let entity_id = object.get("id")?.as_str()?.to_string();

    let version = object.get("version").and_then(Value::as_u64);
    let mut data = FieldMap::new();
    for (key, value) in object {
        if key == "id" || key == "version" {
            continue;
        }
        if let Some(field) = scalar_field(value) {
            data.insert(key.clone(), field);
        }
        // Nested objects/arrays are not scalar cache material; skipped.
    }

    Some(EntityUpdate {
        entity_type: entity_type.to_string(),
        entity_id,
        data,
        version,
    })
}

/// Narrows a JSON value to the closed [`FieldValue`] set. RFC 3339 strings
/// become timestamps; objects and arrays are rejected.
#[must_use]
pub fn scalar_field(value: &Value) -> Option<FieldValue> {
    match value {
        Value::Null => Some(FieldValue::Null),
        Value::Bool(b) => Some(FieldValue::Bool(*b)),
        Value::Number(n) => n.as_f64().map(FieldValue::Number),
        Value::String(s) => Some(
            s.parse::<chrono::DateTime<chrono::Utc>>()
                .map_or_else(|_| FieldValue::Text(s.clone()), FieldValue::Timestamp),
        ),
        Value::Object(_) | Value::Array(_) => None,
    }
}
