//! Configuration for the transport, replayer, and orchestrator.

use std::time::Duration;

/// Configuration for the socket transport.
///
/// The endpoint is an explicit value — the core has no notion of a
/// "current page" or any other ambient location to derive it from.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Socket endpoint, e.g. `wss://sync.example.com/stream`.
    pub endpoint: String,
    /// How long a connection attempt may take before it is forced closed
    /// and retried.
    pub connect_timeout: Duration,
    /// How long a confirmed send waits for its acknowledgment.
    pub ack_timeout: Duration,
    /// Heartbeat probe interval. The connection is declared dead when no
    /// response arrives within twice this interval.
    pub heartbeat_interval: Duration,
    /// First reconnect delay; doubles per attempt.
    pub reconnect_base_delay: Duration,
    /// Ceiling for the reconnect delay.
    pub reconnect_max_delay: Duration,
    /// Reconnect attempts before giving up and staying disconnected.
    pub max_reconnect_attempts: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:8080/sync".to_string(),
            connect_timeout: Duration::from_secs(10),
            ack_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(30),
            reconnect_base_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(30),
            max_reconnect_attempts: 10,
        }
    }
}

/// Configuration for offline queue replay.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Actions per drain batch. Actions within a batch are sent
    /// concurrently; batches run strictly in order.
    pub batch_size: usize,
    /// Replay attempts per action before it is surfaced as a permanent
    /// failure.
    pub max_attempts: u32,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_attempts: 5,
        }
    }
}

/// Configuration for the sync orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Steady-state sync tick interval.
    pub sync_interval: Duration,
    /// Whether mutations are queued and replayed (offline mode).
    pub offline_enabled: bool,
    /// Whether remote change topics are subscribed (real-time mode).
    pub realtime_enabled: bool,
    /// Remote change topics to subscribe to, e.g. `lead_updated`.
    pub topics: Vec<String>,
    /// Failed sync cycles before retries stop.
    pub max_sync_retries: u32,
    /// Replay settings.
    pub replay: ReplayConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(30),
            offline_enabled: true,
            realtime_enabled: true,
            topics: Vec::new(),
            max_sync_retries: 5,
            replay: ReplayConfig::default(),
        }
    }
}
