//! Offline action records.
//!
//! Every mutation attempted while the transport is not connected (or whose
//! confirmed send fails) is recorded as an `OfflineAction` and replayed in
//! FIFO order once connectivity returns.

use crate::{ActionId, FieldMap, OrgId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A mutation awaiting confirmed delivery to the server.
///
/// Lifecycle: created on mutation while unsent, attempted on replay,
/// removed on confirmed success, retained with an incremented attempt count
/// and last error on failure, up to a bounded retry ceiling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineAction {
    /// Unique, time-ordered action id.
    pub id: ActionId,
    /// Entity type the mutation targets.
    pub entity_type: String,
    /// Entity id the mutation targets.
    pub entity_id: String,
    /// The mutated field data.
    pub payload: FieldMap,
    /// The entity version the client assumed when making the mutation.
    /// Replay uses this to recognize that the server has moved on.
    pub base_version: u64,
    /// How many replay attempts have been made.
    pub attempts: u32,
    /// The most recent replay error, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// When the action was recorded.
    pub queued_at: DateTime<Utc>,
    /// Organization whose queue holds this action.
    pub organization_id: OrgId,
    /// User who made the mutation.
    pub user_id: UserId,
}

impl OfflineAction {
    /// Creates a new action with zero attempts, queued now.
    #[must_use]
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        payload: FieldMap,
        base_version: u64,
        organization_id: OrgId,
        user_id: UserId,
    ) -> Self {
        Self {
            id: ActionId::new(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            payload,
            base_version,
            attempts: 0,
            last_error: None,
            queued_at: Utc::now(),
            organization_id,
            user_id,
        }
    }

    /// Records a failed attempt.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.attempts += 1;
        self.last_error = Some(error.into());
    }
}
