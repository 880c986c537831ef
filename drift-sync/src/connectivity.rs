//! The connectivity source interface.
//!
//! The orchestrator reacts to host-reported online/offline transitions but
//! has no dependency on any platform's global environment — the host feeds
//! a watch channel instead.

use tokio::sync::watch;

/// Reports whether the host believes the network is reachable.
pub trait ConnectivitySource: Send + Sync {
    /// Current belief.
    fn is_online(&self) -> bool;

    /// A watch receiver that yields on every online/offline transition.
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// A connectivity source driven by explicit `set_online` calls — the shape
/// host integrations wrap their platform signals in, and what tests use
/// directly.
#[derive(Debug)]
pub struct ManualConnectivity {
    tx: watch::Sender<bool>,
}

impl ManualConnectivity {
    /// Creates a source with the given initial belief.
    #[must_use]
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx }
    }

    /// Reports a transition. Redundant reports are ignored.
    pub fn set_online(&self, online: bool) {
        self.tx.send_if_modified(|current| {
            let changed = *current != online;
            *current = online;
            changed
        });
    }
}

impl Default for ManualConnectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ConnectivitySource for ManualConnectivity {
    fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}
