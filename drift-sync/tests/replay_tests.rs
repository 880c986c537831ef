mod common;

use common::{
    ack_conflict, ack_error, connected_transport, fields, spawn_auto_ack, test_identity,
    RecordingApi,
};
use drift_resolver::{ConflictResolver, Resolution, ResolutionRule};
use drift_store::{ActionQueue, CacheKey, EntityCache, MemoryStore};
use drift_sync::protocol;
use drift_sync::transport::mock::MockHandle;
use drift_sync::{OfflineReplayer, ReplayConfig, UserIdentity};
use drift_types::{EntitySnapshot, FieldValue, OfflineAction, UserId};
use std::sync::Arc;

struct Fixture {
    replayer: OfflineReplayer,
    store: Arc<MemoryStore>,
    resolver: Arc<ConflictResolver>,
    api: Arc<RecordingApi>,
    handle: Arc<MockHandle>,
    identity: UserIdentity,
}

async fn fixture() -> Fixture {
    let (transport, _connector, handle) = connected_transport().await;
    let (_, org, user) = test_identity();
    let store = Arc::new(MemoryStore::new());
    let resolver = Arc::new(ConflictResolver::new());
    let api = Arc::new(RecordingApi::new());

    let replayer = OfflineReplayer::new(
        transport,
        resolver.clone(),
        store.clone(),
        store.clone(),
        api.clone(),
        ReplayConfig {
            batch_size: 10,
            max_attempts: 3,
        },
    );

    Fixture {
        replayer,
        store,
        resolver,
        api,
        handle,
        identity: UserIdentity {
            id: user,
            organization_id: org,
        },
    }
}

fn queued_action(fx: &Fixture, entity_id: &str, base_version: u64) -> OfflineAction {
    let action = OfflineAction::new(
        "lead",
        entity_id,
        fields(&[("notes", "A".into())]),
        base_version,
        fx.identity.organization_id,
        fx.identity.id,
    );
    fx.store
        .append(fx.identity.organization_id, &action)
        .unwrap();
    action
}

/// Conflict-acks every entity update with the given server snapshot.
fn respond_conflict(handle: Arc<MockHandle>, server: EntitySnapshot) {
    tokio::spawn(async move {
        while let Some(message) = handle.sent().await {
            if message.msg_type == protocol::ENTITY_UPDATE {
                handle.push(ack_conflict(&message, server.clone()));
            }
        }
    });
}

/// Error-acks every entity update.
fn respond_error(handle: Arc<MockHandle>, error: &'static str) {
    tokio::spawn(async move {
        while let Some(message) = handle.sent().await {
            if message.msg_type == protocol::ENTITY_UPDATE {
                handle.push(ack_error(&message, error));
            }
        }
    });
}

// ── Happy path ───────────────────────────────────────────────────

#[tokio::test]
async fn confirmed_actions_are_removed_from_the_queue() {
    let fx = fixture().await;
    queued_action(&fx, "l-1", 1);
    queued_action(&fx, "l-2", 1);
    spawn_auto_ack(fx.handle.clone());

    let report = fx.replayer.drain(&fx.identity).await.unwrap();

    assert_eq!(report.attempted, 2);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.retried, 0);
    assert_eq!(
        fx.store.len(fx.identity.organization_id).unwrap(),
        0,
        "confirmed actions must leave the queue"
    );
}

#[tokio::test]
async fn empty_queue_drains_to_an_empty_report() {
    let fx = fixture().await;
    let report = fx.replayer.drain(&fx.identity).await.unwrap();
    assert_eq!(report.attempted, 0);
    assert_eq!(report.succeeded, 0);
}

#[tokio::test]
async fn actions_replay_in_fifo_order() {
    let fx = fixture().await;
    queued_action(&fx, "l-1", 1);
    queued_action(&fx, "l-2", 1);
    queued_action(&fx, "l-3", 1);

    // Record the order entity updates hit the wire, acking each.
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));
    {
        let handle = fx.handle.clone();
        let order = order.clone();
        tokio::spawn(async move {
            while let Some(message) = handle.sent().await {
                if message.msg_type == protocol::ENTITY_UPDATE {
                    let entity_id = message.payload["entityId"].as_str().unwrap().to_string();
                    order.lock().unwrap().push(entity_id);
                    handle.push(common::ack_ok(&message, None));
                }
            }
        });
    }

    fx.replayer.drain(&fx.identity).await.unwrap();

    assert_eq!(*order.lock().unwrap(), vec!["l-1", "l-2", "l-3"]);
}

// ── Retry policy ─────────────────────────────────────────────────

#[tokio::test]
async fn failed_action_is_retained_with_attempt_count() {
    let fx = fixture().await;
    queued_action(&fx, "l-1", 1);
    respond_error(fx.handle.clone(), "backend unavailable");

    let report = fx.replayer.drain(&fx.identity).await.unwrap();

    assert_eq!(report.retried, 1);
    let pending = fx.store.pending(fx.identity.organization_id).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].attempts, 1);
    assert_eq!(pending[0].last_error.as_deref(), Some("backend unavailable"));
}

#[tokio::test]
async fn action_past_attempt_budget_is_dropped_loudly() {
    let fx = fixture().await;
    let mut action = OfflineAction::new(
        "lead",
        "l-1",
        fields(&[("notes", "A".into())]),
        1,
        fx.identity.organization_id,
        fx.identity.id,
    );
    action.attempts = 2; // one failure away from the budget of 3
    fx.store
        .append(fx.identity.organization_id, &action)
        .unwrap();
    respond_error(fx.handle.clone(), "still broken");

    let report = fx.replayer.drain(&fx.identity).await.unwrap();

    assert_eq!(report.permanent_failures.len(), 1);
    assert_eq!(report.permanent_failures[0].0, action.id);
    assert_eq!(
        fx.store.len(fx.identity.organization_id).unwrap(),
        0,
        "a dead action is removed, not retried forever"
    );
}

// ── Conflict routing ─────────────────────────────────────────────

#[tokio::test]
async fn conflicting_replay_goes_through_the_resolver() {
    let fx = fixture().await;
    fx.resolver
        .add_rule(ResolutionRule::new("lead", "notes", Resolution::Merge));

    let key = CacheKey::new("lead", "l-1", fx.identity.organization_id);
    let client = EntitySnapshot::new(fields(&[("notes", "A".into())]), 1, fx.identity.id);
    fx.store.put(&key, &client).unwrap();
    queued_action(&fx, "l-1", 1);

    let server = EntitySnapshot::new(fields(&[("notes", "B".into())]), 2, UserId::new());
    respond_conflict(fx.handle.clone(), server);

    let report = fx.replayer.drain(&fx.identity).await.unwrap();

    assert_eq!(report.conflicts.len(), 1);
    let (conflict, result) = &report.conflicts[0];
    assert_eq!(conflict.conflict_fields, vec!["notes"]);
    assert_eq!(result.conflicts_resolved, 1);

    // The merged value is cached and pushed, and the action retired.
    let cached = fx.store.get(&key).unwrap().unwrap();
    assert_eq!(cached.data["notes"], FieldValue::Text("B | A".into()));
    let calls = fx.api.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].2["notes"], FieldValue::Text("B | A".into()));
    assert_eq!(fx.store.len(fx.identity.organization_id).unwrap(), 0);
}

#[tokio::test]
async fn replay_against_matching_server_state_is_a_noop() {
    let fx = fixture().await;

    // The cache already holds exactly what the server holds — e.g. a
    // previous replay of this very action got through but its ack was
    // lost. The second replay must not double-apply.
    let key = CacheKey::new("lead", "l-1", fx.identity.organization_id);
    let server = EntitySnapshot::new(fields(&[("notes", "B".into())]), 2, fx.identity.id);
    fx.store.put(&key, &server).unwrap();
    queued_action(&fx, "l-1", 2);

    respond_conflict(fx.handle.clone(), server);

    let report = fx.replayer.drain(&fx.identity).await.unwrap();

    assert_eq!(report.noops, 1);
    assert_eq!(report.conflicts.len(), 0);
    assert!(fx.api.calls().is_empty(), "no resolved write for a no-op");
    assert_eq!(fx.store.len(fx.identity.organization_id).unwrap(), 0);
}

#[tokio::test]
async fn failed_resolution_push_retains_the_action() {
    let fx = fixture().await;
    fx.resolver
        .add_rule(ResolutionRule::new("lead", "notes", Resolution::Merge));
    fx.api.set_fail(true);

    let key = CacheKey::new("lead", "l-1", fx.identity.organization_id);
    let client = EntitySnapshot::new(fields(&[("notes", "A".into())]), 1, fx.identity.id);
    fx.store.put(&key, &client).unwrap();
    queued_action(&fx, "l-1", 1);

    let server = EntitySnapshot::new(fields(&[("notes", "B".into())]), 2, UserId::new());
    respond_conflict(fx.handle.clone(), server);

    let report = fx.replayer.drain(&fx.identity).await.unwrap();

    assert_eq!(report.retried, 1);
    let pending = fx.store.pending(fx.identity.organization_id).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].attempts, 1);
}

// ── Batching ─────────────────────────────────────────────────────

#[tokio::test]
async fn drains_more_actions_than_one_batch() {
    let fx = fixture().await;
    for i in 0..25 {
        queued_action(&fx, &format!("l-{i}"), 1);
    }
    spawn_auto_ack(fx.handle.clone());

    let report = fx.replayer.drain(&fx.identity).await.unwrap();

    assert_eq!(report.attempted, 25);
    assert_eq!(report.succeeded, 25);
    assert_eq!(fx.store.len(fx.identity.organization_id).unwrap(), 0);
}
