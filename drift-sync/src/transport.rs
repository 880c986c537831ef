//! Transport layer abstraction.
//!
//! The socket transport is generic over a [`Connector`], which produces a
//! pair of boxed sink/stream halves per connection. Production uses the
//! WebSocket connector; tests use [`mock::MockConnector`] to script
//! connect failures and drive frames in both directions.

use crate::error::{TransportError, TransportResult};
use async_trait::async_trait;
use drift_types::WireMessage;
use serde::{Deserialize, Serialize};

/// Connection lifecycle state, published on a watch channel. Exactly one
/// state is active at a time; there is no terminal state — the machine
/// cycles for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection and none being attempted.
    Disconnected,
    /// First connection attempt in progress.
    Connecting,
    /// Connected and exchanging messages.
    Connected,
    /// A socket-level error was observed; a close follows.
    Error,
    /// Waiting out a backoff delay before the next attempt.
    Reconnecting,
}

/// The write half of a connection.
#[async_trait]
pub trait MessageSink: Send {
    /// Serializes and transmits one message.
    async fn send(&mut self, message: &WireMessage) -> TransportResult<()>;

    /// Closes the connection cleanly (distinct close code from abnormal
    /// closure, where the protocol has one).
    async fn close(&mut self) -> TransportResult<()>;
}

/// The read half of a connection.
#[async_trait]
pub trait MessageStream: Send {
    /// Receives the next message. `None` means the connection closed.
    async fn next(&mut self) -> Option<TransportResult<WireMessage>>;
}

/// Boxed connection halves, as produced by a [`Connector`].
pub type Connection = (Box<dyn MessageSink>, Box<dyn MessageStream>);

/// Establishes connections to the sync endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a new connection to `endpoint`.
    async fn connect(&self, endpoint: &str) -> TransportResult<Connection>;
}

/// A mock connector for testing.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    /// Test-side handle onto one accepted mock connection.
    ///
    /// `outgoing` observes everything the transport sends; `incoming`
    /// injects frames for the transport to receive. Dropping `incoming`
    /// (via [`MockHandle::close`]) closes the connection from the remote
    /// side.
    pub struct MockHandle {
        outgoing: tokio::sync::Mutex<mpsc::UnboundedReceiver<WireMessage>>,
        incoming: Mutex<Option<mpsc::UnboundedSender<TransportResult<WireMessage>>>>,
    }

    impl MockHandle {
        /// Next message the transport sent, if any has arrived.
        pub async fn try_sent(&self) -> Option<WireMessage> {
            self.outgoing.lock().await.try_recv().ok()
        }

        /// Waits for the next message the transport sends.
        pub async fn sent(&self) -> Option<WireMessage> {
            self.outgoing.lock().await.recv().await
        }

        /// Injects a message for the transport to receive.
        pub fn push(&self, message: WireMessage) {
            if let Some(tx) = &*self.incoming.lock().unwrap_or_else(|e| e.into_inner()) {
                let _ = tx.send(Ok(message));
            }
        }

        /// Injects a socket-level error.
        pub fn push_error(&self, error: TransportError) {
            if let Some(tx) = &*self.incoming.lock().unwrap_or_else(|e| e.into_inner()) {
                let _ = tx.send(Err(error));
            }
        }

        /// Closes the connection from the remote side.
        pub fn close(&self) {
            self.incoming.lock().unwrap_or_else(|e| e.into_inner()).take();
        }
    }

    /// A connector whose connections are in-memory channel pairs.
    #[derive(Default)]
    pub struct MockConnector {
        fail_next: AtomicU32,
        fail_all: std::sync::atomic::AtomicBool,
        attempts: AtomicU32,
        handles: Mutex<Vec<Arc<MockHandle>>>,
    }

    impl MockConnector {
        /// Creates a connector that accepts every connection.
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes the next `n` connection attempts fail.
        pub fn fail_next(&self, n: u32) {
            self.fail_next.store(n, Ordering::SeqCst);
        }

        /// Makes every connection attempt fail.
        pub fn fail_all(&self, fail: bool) {
            self.fail_all.store(fail, Ordering::SeqCst);
        }

        /// Number of connection attempts made, accepted or not.
        pub fn attempt_count(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }

        /// Number of connections accepted so far.
        pub fn connection_count(&self) -> usize {
            self.handles.lock().unwrap_or_else(|e| e.into_inner()).len()
        }

        /// Handle for the most recently accepted connection.
        pub fn last_handle(&self) -> Option<Arc<MockHandle>> {
            self.handles
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .last()
                .cloned()
        }
    }

    struct MockSink {
        tx: mpsc::UnboundedSender<WireMessage>,
        closed: bool,
    }

    #[async_trait]
    impl MessageSink for MockSink {
        async fn send(&mut self, message: &WireMessage) -> TransportResult<()> {
            if self.closed {
                return Err(TransportError::ConnectionClosed);
            }
            self.tx
                .send(message.clone())
                .map_err(|_| TransportError::ConnectionClosed)
        }

        async fn close(&mut self) -> TransportResult<()> {
            self.closed = true;
            Ok(())
        }
    }

    struct MockStream {
        rx: mpsc::UnboundedReceiver<TransportResult<WireMessage>>,
    }

    #[async_trait]
    impl MessageStream for MockStream {
        async fn next(&mut self) -> Option<TransportResult<WireMessage>> {
            self.rx.recv().await
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn connect(&self, _endpoint: &str) -> TransportResult<Connection> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail_all.load(Ordering::SeqCst) {
                return Err(TransportError::ConnectionFailed("mock refused".into()));
            }
            let remaining = self.fail_next.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_next.store(remaining - 1, Ordering::SeqCst);
                return Err(TransportError::ConnectionFailed("mock refused".into()));
            }

            let (out_tx, out_rx) = mpsc::unbounded_channel();
            let (in_tx, in_rx) = mpsc::unbounded_channel();

            let handle = Arc::new(MockHandle {
                outgoing: tokio::sync::Mutex::new(out_rx),
                incoming: Mutex::new(Some(in_tx)),
            });
            self.handles
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(handle);

            Ok((
                Box::new(MockSink {
                    tx: out_tx,
                    closed: false,
                }),
                Box::new(MockStream { rx: in_rx }),
            ))
        }
    }
}
