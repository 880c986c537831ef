//! In-memory store for tests and ephemeral sessions.

use crate::{ActionQueue, CacheKey, EntityCache, StoreResult};
use drift_types::{ActionId, EntitySnapshot, OfflineAction, OrgId};
use std::collections::HashMap;
use std::sync::Mutex;

/// A store backed by process memory. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    cache: Mutex<HashMap<CacheKey, EntitySnapshot>>,
    queues: Mutex<HashMap<OrgId, Vec<OfflineAction>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl EntityCache for MemoryStore {
    fn get(&self, key: &CacheKey) -> StoreResult<Option<EntitySnapshot>> {
        Ok(self.cache.lock().unwrap_or_else(|e| e.into_inner()).get(key).cloned())
    }

    fn put(&self, key: &CacheKey, snapshot: &EntitySnapshot) -> StoreResult<()> {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.clone(), snapshot.clone());
        Ok(())
    }

    fn delete(&self, key: &CacheKey) -> StoreResult<()> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).remove(key);
        Ok(())
    }
}

impl ActionQueue for MemoryStore {
    fn append(&self, org: OrgId, action: &OfflineAction) -> StoreResult<()> {
        self.queues
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(org)
            .or_default()
            .push(action.clone());
        Ok(())
    }

    fn pending(&self, org: OrgId) -> StoreResult<Vec<OfflineAction>> {
        Ok(self
            .queues
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&org)
            .cloned()
            .unwrap_or_default())
    }

    fn update(&self, org: OrgId, action: &OfflineAction) -> StoreResult<()> {
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(queue) = queues.get_mut(&org) {
            if let Some(slot) = queue.iter_mut().find(|a| a.id == action.id) {
                *slot = action.clone();
            }
        }
        Ok(())
    }

    fn remove(&self, org: OrgId, id: ActionId) -> StoreResult<()> {
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(queue) = queues.get_mut(&org) {
            queue.retain(|a| a.id != id);
        }
        Ok(())
    }

    fn clear(&self, org: OrgId) -> StoreResult<()> {
        self.queues.lock().unwrap_or_else(|e| e.into_inner()).remove(&org);
        Ok(())
    }
}
