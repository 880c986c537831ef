//! File-backed store: fsynced JSONL queues plus per-organization cache
//! files.
//!
//! Each organization's offline queue lives in `queue-{org}.jsonl`, one
//! action per line, fsynced on append so queued mutations survive a crash.
//! Removal rewrites the file without the dropped lines. The entity cache
//! lives in `cache-{org}.json`, rewritten atomically (temp file + rename)
//! on every put/delete — client caches are small and reads dominate.

use crate::{ActionQueue, CacheKey, EntityCache, StoreResult};
use drift_types::{ActionId, EntitySnapshot, OfflineAction, OrgId};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// A store rooted at a directory on disk. Survives process restart.
pub struct JsonlStore {
    root: PathBuf,
    // Serializes rewrites; the files themselves are the source of truth.
    lock: Mutex<()>,
}

impl JsonlStore {
    /// Opens (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            lock: Mutex::new(()),
        })
    }

    fn queue_path(&self, org: OrgId) -> PathBuf {
        self.root.join(format!("queue-{org}.jsonl"))
    }

    fn cache_path(&self, org: OrgId) -> PathBuf {
        self.root.join(format!("cache-{org}.json"))
    }

    fn read_queue(path: &Path) -> StoreResult<Vec<OfflineAction>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let reader = BufReader::new(file);
        let mut actions = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(action) => actions.push(action),
                // A torn final line from a crash mid-append is expected;
                // keep everything before it.
                Err(e) => warn!("skipping unreadable queue line: {e}"),
            }
        }
        Ok(actions)
    }

    fn write_queue(path: &Path, actions: &[OfflineAction]) -> StoreResult<()> {
        let mut file = File::create(path)?;
        for action in actions {
            let json = serde_json::to_string(action)?;
            writeln!(file, "{json}")?;
        }
        file.sync_all()?;
        Ok(())
    }

    fn read_cache(path: &Path) -> StoreResult<BTreeMap<String, EntitySnapshot>> {
        match fs::read(path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_cache(path: &Path, entries: &BTreeMap<String, EntitySnapshot>) -> StoreResult<()> {
        let tmp = path.with_extension("json.tmp");
        let mut file = File::create(&tmp)?;
        file.write_all(&serde_json::to_vec(entries)?)?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn cache_entry_key(key: &CacheKey) -> String {
        format!("{}/{}", key.entity_type, key.entity_id)
    }
}

impl EntityCache for JsonlStore {
    fn get(&self, key: &CacheKey) -> StoreResult<Option<EntitySnapshot>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let entries = Self::read_cache(&self.cache_path(key.organization_id))?;
        Ok(entries.get(&Self::cache_entry_key(key)).cloned())
    }

    fn put(&self, key: &CacheKey, snapshot: &EntitySnapshot) -> StoreResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let path = self.cache_path(key.organization_id);
        let mut entries = Self::read_cache(&path)?;
        entries.insert(Self::cache_entry_key(key), snapshot.clone());
        Self::write_cache(&path, &entries)
    }

    fn delete(&self, key: &CacheKey) -> StoreResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let path = self.cache_path(key.organization_id);
        let mut entries = Self::read_cache(&path)?;
        if entries.remove(&Self::cache_entry_key(key)).is_some() {
            Self::write_cache(&path, &entries)?;
        }
        Ok(())
    }
}

impl ActionQueue for JsonlStore {
    fn append(&self, org: OrgId, action: &OfflineAction) -> StoreResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.queue_path(org))?;
        let json = serde_json::to_string(action)?;
        writeln!(file, "{json}")?;
        file.sync_all()?;
        Ok(())
    }

    fn pending(&self, org: OrgId) -> StoreResult<Vec<OfflineAction>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Self::read_queue(&self.queue_path(org))
    }

    fn update(&self, org: OrgId, action: &OfflineAction) -> StoreResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let path = self.queue_path(org);
        let mut actions = Self::read_queue(&path)?;
        let mut changed = false;
        for slot in &mut actions {
            if slot.id == action.id {
                *slot = action.clone();
                changed = true;
            }
        }
        if changed {
            Self::write_queue(&path, &actions)?;
        }
        Ok(())
    }

    fn remove(&self, org: OrgId, id: ActionId) -> StoreResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let path = self.queue_path(org);
        let actions = Self::read_queue(&path)?;
        let remaining: Vec<_> = actions.into_iter().filter(|a| a.id != id).collect();
        Self::write_queue(&path, &remaining)
    }

    fn clear(&self, org: OrgId) -> StoreResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        match fs::remove_file(self.queue_path(org)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
