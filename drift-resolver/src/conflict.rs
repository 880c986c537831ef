//! Conflict records and merge results.

use crate::Resolution;
use chrono::{DateTime, Utc};
use drift_types::{EntitySnapshot, FieldMap, OrgId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A detected per-field divergence between a client-held and a server-held
/// version of the same entity. Created only when at least one field
/// differs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    /// Unique conflict id.
    pub id: Uuid,
    /// Entity type of the diverging record.
    pub entity_type: String,
    /// Entity id of the diverging record.
    pub entity_id: String,
    /// The client's snapshot.
    pub client: EntitySnapshot,
    /// The server's snapshot.
    pub server: EntitySnapshot,
    /// Fields whose values differ (including fields present on only one
    /// side).
    pub conflict_fields: Vec<String>,
    /// When the conflict was detected.
    pub timestamp: DateTime<Utc>,
    /// User on whose behalf the client snapshot was made, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    /// Organization scope, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<OrgId>,
}

impl Conflict {
    /// Creates a conflict record, stamped now.
    #[must_use]
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        client: EntitySnapshot,
        server: EntitySnapshot,
        conflict_fields: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            client,
            server,
            conflict_fields,
            timestamp: Utc::now(),
            user_id: None,
            organization_id: None,
        }
    }

    /// Stamps the organization and user scope onto the record.
    #[must_use]
    pub fn with_scope(mut self, organization_id: OrgId, user_id: UserId) -> Self {
        self.organization_id = Some(organization_id);
        self.user_id = Some(user_id);
        self
    }

    /// The client snapshot's version counter.
    #[must_use]
    pub fn client_version(&self) -> u64 {
        self.client.version
    }

    /// The server snapshot's version counter.
    #[must_use]
    pub fn server_version(&self) -> u64 {
        self.server.version
    }
}

/// The outcome of resolving a conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResult {
    /// The merged field map (server base + per-field resolutions).
    pub data: FieldMap,
    /// How many conflicting fields were resolved automatically.
    pub conflicts_resolved: usize,
    /// Fields deferred to user choice; the server's value stands
    /// provisionally for each.
    pub conflicts_remaining: Vec<String>,
    /// The most common per-field strategy applied.
    pub resolution_strategy: Resolution,
    /// Bookkeeping about the merge.
    pub metadata: MergeMetadata,
}

/// Bookkeeping attached to a merge result; shipped to the server as
/// `resolution_metadata` alongside the resolved write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeMetadata {
    /// When the merge ran.
    pub merged_at: DateTime<Utc>,
    /// Which strategy each conflicting field received. Downgraded fields
    /// (failing mergers) are recorded as [`Resolution::UserChoice`].
    pub applied: BTreeMap<String, Resolution>,
    /// Versions the merge was computed from.
    pub client_version: u64,
    /// Versions the merge was computed from.
    pub server_version: u64,
}
