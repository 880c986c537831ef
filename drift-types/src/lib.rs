//! Core type definitions for the drift sync engine.
//!
//! This crate defines the fundamental, domain-agnostic types shared by the
//! sync core:
//! - Organization, user, message, and action identifiers (UUID v7)
//! - The typed field-value model used for entity data
//! - Versioned entity snapshots with content checksums
//! - The wire message envelope exchanged over the socket
//! - Offline action records awaiting replay
//!
//! Domain-specific record semantics (what a "lead" or an "opportunity"
//! contains) do not belong here — the sync core is generic over
//! `entity type + entity id + field map`.

mod action;
mod ids;
mod message;
mod snapshot;
mod value;

pub use action::OfflineAction;
pub use ids::{ActionId, MessageId, OrgId, UserId};
pub use message::WireMessage;
pub use snapshot::{checksum_of, EntitySnapshot};
pub use value::{FieldMap, FieldValue};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}
