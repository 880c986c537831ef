//! Versioned entity snapshots.
//!
//! A snapshot is a copy of an entity's field data with the metadata needed
//! for conflict detection: a server-assigned version counter, the last
//! modification time, the modifying user, and a content checksum.

use crate::{FieldMap, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A versioned copy of an entity's field data.
///
/// Two snapshots of the same `(entity_type, entity_id)` are compared
/// field-by-field during conflict detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySnapshot {
    /// The entity's field data.
    pub data: FieldMap,
    /// Monotonic version counter assigned by the authoritative store.
    pub version: u64,
    /// When this version was produced.
    pub last_modified: DateTime<Utc>,
    /// Who produced this version.
    pub modified_by: UserId,
    /// SHA-256 over the canonical JSON of `data`.
    pub checksum: String,
}

impl EntitySnapshot {
    /// Creates a snapshot at the current time, computing the checksum.
    #[must_use]
    pub fn new(data: FieldMap, version: u64, modified_by: UserId) -> Self {
        let checksum = checksum_of(&data);
        Self {
            data,
            version,
            last_modified: Utc::now(),
            modified_by,
            checksum,
        }
    }

    /// Creates a snapshot with an explicit modification time (for replay
    /// and tests).
    #[must_use]
    pub fn with_timestamp(
        data: FieldMap,
        version: u64,
        modified_by: UserId,
        last_modified: DateTime<Utc>,
    ) -> Self {
        let checksum = checksum_of(&data);
        Self {
            data,
            version,
            last_modified,
            modified_by,
            checksum,
        }
    }

    /// Whether the stored checksum still matches the data.
    #[must_use]
    pub fn checksum_valid(&self) -> bool {
        self.checksum == checksum_of(&self.data)
    }
}

/// Computes the SHA-256 checksum of a field map's canonical JSON.
///
/// `FieldMap` is a `BTreeMap`, so serialization order is deterministic and
/// equal maps always produce equal checksums.
#[must_use]
pub fn checksum_of(data: &FieldMap) -> String {
    // Serializing a map of scalars cannot fail.
    let json = serde_json::to_string(data).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    hex::encode(hasher.finalize())
}
