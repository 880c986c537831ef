//! Shared helpers for drift-sync integration tests.

// Each test binary compiles this module separately and uses a subset.
#![allow(dead_code)]

use async_trait::async_trait;
use drift_resolver::MergeMetadata;
use drift_sync::protocol::{self, AckPayload, AckStatus};
use drift_sync::transport::mock::{MockConnector, MockHandle};
use drift_sync::{RemoteApi, SocketTransport, StaticIdentity, SyncResult, TransportConfig};
use drift_types::{EntitySnapshot, FieldMap, OrgId, UserId, WireMessage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A fixed signed-in identity plus its ids.
pub fn test_identity() -> (Arc<StaticIdentity>, OrgId, UserId) {
    let org = OrgId::new();
    let user = UserId::new();
    (Arc::new(StaticIdentity::new(user, org)), org, user)
}

/// Transport config with short timings so paused-clock tests stay fast.
pub fn fast_transport_config() -> TransportConfig {
    TransportConfig {
        endpoint: "ws://test".to_string(),
        connect_timeout: Duration::from_millis(500),
        ack_timeout: Duration::from_secs(10),
        heartbeat_interval: Duration::from_secs(30),
        reconnect_base_delay: Duration::from_millis(100),
        reconnect_max_delay: Duration::from_secs(5),
        max_reconnect_attempts: 3,
    }
}

/// Spawns a transport over a fresh mock connector and connects it.
pub async fn connected_transport() -> (Arc<SocketTransport>, Arc<MockConnector>, Arc<MockHandle>) {
    let connector = Arc::new(MockConnector::new());
    let transport = Arc::new(SocketTransport::spawn(
        fast_transport_config(),
        connector.clone(),
    ));
    transport.connect().await.unwrap();
    let mut states = transport.state_changes();
    states
        .wait_for(|s| *s == drift_sync::ConnectionState::Connected)
        .await
        .unwrap();
    let handle = connector.last_handle().unwrap();
    (transport, connector, handle)
}

/// Builds an ok-ack for a message, optionally carrying the committed
/// snapshot.
pub fn ack_ok(original: &WireMessage, server: Option<EntitySnapshot>) -> WireMessage {
    let payload = AckPayload {
        status: AckStatus::Ok,
        error: None,
        server,
    };
    original.ack_with(serde_json::to_value(payload).unwrap())
}

/// Builds a conflict-ack carrying the server's current snapshot.
pub fn ack_conflict(original: &WireMessage, server: EntitySnapshot) -> WireMessage {
    let payload = AckPayload {
        status: AckStatus::Conflict,
        error: None,
        server: Some(server),
    };
    original.ack_with(serde_json::to_value(payload).unwrap())
}

/// Builds an error-ack.
pub fn ack_error(original: &WireMessage, error: &str) -> WireMessage {
    let payload = AckPayload {
        status: AckStatus::Error,
        error: Some(error.to_string()),
        server: None,
    };
    original.ack_with(serde_json::to_value(payload).unwrap())
}

/// Acknowledges every ack-requiring message the transport sends, with
/// `AckStatus::Ok`, until the connection closes.
pub fn spawn_auto_ack(handle: Arc<MockHandle>) {
    tokio::spawn(async move {
        while let Some(message) = handle.sent().await {
            if message.msg_type == protocol::ENTITY_UPDATE
                || message.msg_type == protocol::SUBSCRIBE
            {
                handle.push(ack_ok(&message, None));
            }
        }
    });
}

/// A [`RemoteApi`] that records calls and can be told to fail.
#[derive(Default)]
pub struct RecordingApi {
    calls: Mutex<Vec<(String, String, FieldMap)>>,
    fail: AtomicBool,
}

impl RecordingApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<(String, String, FieldMap)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteApi for RecordingApi {
    async fn put_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
        data: &FieldMap,
        _metadata: &MergeMetadata,
    ) -> SyncResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(drift_sync::SyncError::Api("recording api failure".into()));
        }
        self.calls.lock().unwrap().push((
            entity_type.to_string(),
            entity_id.to_string(),
            data.clone(),
        ));
        Ok(())
    }
}

/// Field map literal helper.
pub fn fields(pairs: &[(&str, drift_types::FieldValue)]) -> FieldMap {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}
