use drift_store::{ActionQueue, CacheKey, EntityCache, JsonlStore};
use drift_types::{EntitySnapshot, FieldMap, OfflineAction, OrgId, UserId};
use std::fs::OpenOptions;
use std::io::Write;

fn snapshot(version: u64) -> EntitySnapshot {
    let mut data = FieldMap::new();
    data.insert("name".into(), "Acme".into());
    EntitySnapshot::new(data, version, UserId::new())
}

fn action(org: OrgId, entity_id: &str) -> OfflineAction {
    let mut payload = FieldMap::new();
    payload.insert("stage".into(), "won".into());
    OfflineAction::new("lead", entity_id, payload, 1, org, UserId::new())
}

#[test]
fn queue_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let org = OrgId::new();
    let queued = action(org, "l-1");

    {
        let store = JsonlStore::open(dir.path()).unwrap();
        store.append(org, &queued).unwrap();
    }

    let store = JsonlStore::open(dir.path()).unwrap();
    let pending = store.pending(org).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0], queued);
}

#[test]
fn cache_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let key = CacheKey::new("lead", "l-1", OrgId::new());
    let snap = snapshot(4);

    {
        let store = JsonlStore::open(dir.path()).unwrap();
        store.put(&key, &snap).unwrap();
    }

    let store = JsonlStore::open(dir.path()).unwrap();
    assert_eq!(store.get(&key).unwrap(), Some(snap));
}

#[test]
fn remove_rewrites_without_dropped_action() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonlStore::open(dir.path()).unwrap();
    let org = OrgId::new();

    let a = action(org, "l-1");
    let b = action(org, "l-2");
    let c = action(org, "l-3");
    for x in [&a, &b, &c] {
        store.append(org, x).unwrap();
    }

    store.remove(org, b.id).unwrap();
    let pending = store.pending(org).unwrap();
    assert_eq!(
        pending.iter().map(|x| x.id).collect::<Vec<_>>(),
        vec![a.id, c.id]
    );
}

#[test]
fn update_persists_attempt_counts() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonlStore::open(dir.path()).unwrap();
    let org = OrgId::new();

    let mut a = action(org, "l-1");
    store.append(org, &a).unwrap();
    a.record_failure("send failed");
    store.update(org, &a).unwrap();

    let reopened = JsonlStore::open(dir.path()).unwrap();
    let pending = reopened.pending(org).unwrap();
    assert_eq!(pending[0].attempts, 1);
}

#[test]
fn torn_trailing_line_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let org = OrgId::new();

    let store = JsonlStore::open(dir.path()).unwrap();
    store.append(org, &action(org, "l-1")).unwrap();

    // Simulate a crash mid-append: garbage on the final line.
    let path = dir.path().join(format!("queue-{org}.jsonl"));
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    write!(file, "{{\"id\":\"trunc").unwrap();

    let pending = store.pending(org).unwrap();
    assert_eq!(pending.len(), 1);
}

#[test]
fn clear_missing_queue_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonlStore::open(dir.path()).unwrap();
    store.clear(OrgId::new()).unwrap();
}
