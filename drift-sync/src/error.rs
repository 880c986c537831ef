//! Error types for the sync layer.

use thiserror::Error;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors from the socket transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection could not be established.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The connection was closed (cleanly or otherwise) while an operation
    /// was outstanding.
    #[error("connection closed")]
    ConnectionClosed,

    /// The transport's command channel is gone (transport dropped).
    #[error("channel closed")]
    ChannelClosed,

    /// A send on an open socket failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// A receive on an open socket failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// No acknowledgment arrived within the ack timeout.
    #[error("acknowledgment timed out")]
    AckTimeout,

    /// The server acknowledged with an error status.
    #[error("rejected by server: {0}")]
    Rejected(String),

    /// Message serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Local store error.
    #[error("store error: {0}")]
    Store(#[from] drift_store::StoreError),

    /// Remote write API error.
    #[error("remote API error: {0}")]
    Api(String),

    /// HTTP client error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// No authenticated user/organization available.
    #[error("no authenticated user")]
    NoIdentity,

    /// Protocol error (unexpected message shape).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
