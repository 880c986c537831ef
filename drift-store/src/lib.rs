//! Local storage for the drift sync engine.
//!
//! The sync core consumes the local store through two narrow traits:
//! - [`EntityCache`] — cached entity snapshots keyed by
//!   `(entity_type, entity_id, organization)`
//! - [`ActionQueue`] — the durable, FIFO-ordered offline action queue,
//!   partitioned by organization
//!
//! Two implementations ship with the crate: [`MemoryStore`] for tests and
//! [`JsonlStore`], which persists to fsynced JSONL/JSON files and survives
//! process restart. Anything smarter (embedded databases, encrypted vaults)
//! can slot in behind the same traits.

mod error;
mod jsonl;
mod memory;

pub use error::{StoreError, StoreResult};
pub use jsonl::JsonlStore;
pub use memory::MemoryStore;

use drift_types::{ActionId, EntitySnapshot, OfflineAction, OrgId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Key identifying a cached entity snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Entity type, e.g. `"lead"`.
    pub entity_type: String,
    /// Entity id within the type.
    pub entity_id: String,
    /// Owning organization.
    pub organization_id: OrgId,
}

impl CacheKey {
    /// Creates a cache key.
    #[must_use]
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        organization_id: OrgId,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            organization_id,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.organization_id, self.entity_type, self.entity_id
        )
    }
}

/// Cached entity snapshots.
pub trait EntityCache: Send + Sync {
    /// Returns the cached snapshot for a key, if any.
    fn get(&self, key: &CacheKey) -> StoreResult<Option<EntitySnapshot>>;

    /// Stores or replaces the snapshot for a key.
    fn put(&self, key: &CacheKey, snapshot: &EntitySnapshot) -> StoreResult<()>;

    /// Removes the snapshot for a key. Removing a missing key is a no-op.
    fn delete(&self, key: &CacheKey) -> StoreResult<()>;
}

/// The durable offline action queue, FIFO-ordered per organization.
pub trait ActionQueue: Send + Sync {
    /// Appends an action to the end of an organization's queue.
    fn append(&self, org: OrgId, action: &OfflineAction) -> StoreResult<()>;

    /// Returns all pending actions for an organization, in append order.
    fn pending(&self, org: OrgId) -> StoreResult<Vec<OfflineAction>>;

    /// Rewrites a queued action in place (attempt counts, last error).
    /// Updating an action that is no longer queued is a no-op.
    fn update(&self, org: OrgId, action: &OfflineAction) -> StoreResult<()>;

    /// Removes a single action by id. Removing a missing id is a no-op.
    fn remove(&self, org: OrgId, id: ActionId) -> StoreResult<()>;

    /// Removes every action for an organization.
    fn clear(&self, org: OrgId) -> StoreResult<()>;

    /// Returns the number of pending actions for an organization.
    fn len(&self, org: OrgId) -> StoreResult<usize> {
        Ok(self.pending(org)?.len())
    }
}
