//! The unified sync event stream and status snapshot.
//!
//! The orchestrator is the single place where transport connectivity,
//! queue-drain outcomes, and conflict detections merge into one ordered,
//! timestamped event stream delivered to registered listeners.

use crate::transport::ConnectionState;
use chrono::{DateTime, Utc};
use drift_resolver::Conflict;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::warn;

/// A timestamped sync event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEvent {
    /// What happened.
    #[serde(flatten)]
    pub kind: SyncEventKind,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
}

impl SyncEvent {
    /// Creates an event stamped now.
    #[must_use]
    pub fn new(kind: SyncEventKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
        }
    }
}

/// The event kinds in the unified stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum SyncEventKind {
    /// A sync cycle began.
    SyncStarted,
    /// A sync cycle finished; carries the remaining queue depth.
    SyncCompleted {
        /// Actions still pending after the drain.
        pending_actions: usize,
    },
    /// A sync cycle (or a permanently failed action) failed.
    SyncFailed {
        /// Human-readable failure description.
        error: String,
        /// Consecutive failed cycles so far.
        error_count: u32,
    },
    /// Replay found a diverged entity and ran it through the resolver.
    ConflictDetected {
        /// The detected conflict.
        conflict: Conflict,
        /// Fields the resolver could not settle automatically.
        unresolved_fields: Vec<String>,
    },
    /// The host reported the network as gone.
    OfflineDetected,
    /// The host reported the network as back.
    OnlineDetected,
}

/// Point-in-time status for the UI layer; reflects state rather than raw
/// exceptions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// The host's current connectivity belief.
    pub is_online: bool,
    /// The transport's connection state.
    pub connection_state: ConnectionState,
    /// Offline actions awaiting replay.
    pub pending_actions: usize,
    /// Completion time of the last successful sync cycle.
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Conflicts detected since startup.
    pub conflicts_count: u64,
    /// Consecutive failed sync cycles.
    pub error_count: u32,
}

/// Handle for removing a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

/// Fan-out of sync events to registered listeners.
///
/// Delivery is in registration order; a panicking listener is caught and
/// logged so the remaining listeners still run.
#[derive(Default)]
pub struct EventDispatcher {
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
}

impl EventDispatcher {
    /// Creates an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener; returns its removal handle.
    pub fn add_listener(&self, listener: impl Fn(&SyncEvent) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(listener)));
        id
    }

    /// Removes a listener. Returns whether it was registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Delivers an event to every listener.
    ///
    /// Listeners are snapshotted before the calls so a listener that
    /// (un)registers listeners does not deadlock the dispatcher.
    pub fn emit(&self, event: &SyncEvent) {
        let snapshot: Vec<Listener> = self
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                warn!("sync event listener panicked; continuing delivery");
            }
        }
    }
}
