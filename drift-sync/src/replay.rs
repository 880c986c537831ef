//! Offline queue replay.
//!
//! Drains queued mutations in FIFO order once connectivity is back:
//! batches of `batch_size` actions are sent concurrently (all-settled
//! within a batch), batches themselves run strictly in order. A replayed
//! action the server reports as conflicting is routed through the conflict
//! resolver; only the resolved result is written back to the cache and
//! pushed to the server.

use crate::api::RemoteApi;
use crate::config::ReplayConfig;
use crate::error::SyncResult;
use crate::identity::UserIdentity;
use crate::protocol::{self, AckPayload, AckStatus, EntityUpdatePayload};
use crate::socket::SocketTransport;
use drift_resolver::{Conflict, ConflictResolver, MergeResult};
use drift_store::{ActionQueue, CacheKey, EntityCache};
use drift_types::{ActionId, EntitySnapshot, OfflineAction, OrgId};
use futures_util::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of one drain pass.
#[derive(Debug, Default)]
pub struct ReplayReport {
    /// Actions taken from the queue this pass.
    pub attempted: usize,
    /// Actions confirmed by the server and removed.
    pub succeeded: usize,
    /// Actions recognized as already applied (idempotent replay).
    pub noops: usize,
    /// Actions retained for a later drain after a failure.
    pub retried: usize,
    /// Conflicts detected and resolved during replay.
    pub conflicts: Vec<(Conflict, MergeResult)>,
    /// Actions dropped after exhausting their attempt budget.
    pub permanent_failures: Vec<(ActionId, String)>,
}

enum ActionOutcome {
    Applied,
    Noop,
    Conflict(Box<(Conflict, MergeResult)>),
    Retried,
    PermanentFailure(ActionId, String),
}

/// Replays the offline queue through the transport.
pub struct OfflineReplayer {
    transport: Arc<SocketTransport>,
    resolver: Arc<ConflictResolver>,
    cache: Arc<dyn EntityCache>,
    queue: Arc<dyn ActionQueue>,
    api: Arc<dyn RemoteApi>,
    config: ReplayConfig,
}

impl OfflineReplayer {
    /// Creates a replayer over the given collaborators.
    pub fn new(
        transport: Arc<SocketTransport>,
        resolver: Arc<ConflictResolver>,
        cache: Arc<dyn EntityCache>,
        queue: Arc<dyn ActionQueue>,
        api: Arc<dyn RemoteApi>,
        config: ReplayConfig,
    ) -> Self {
        Self {
            transport,
            resolver,
            cache,
            queue,
            api,
            config,
        }
    }

    /// One drain pass over the user's organization queue.
    ///
    /// Each queued action is attempted once; failures are retained with an
    /// incremented attempt count for the next pass rather than retried in
    /// a loop here.
    pub async fn drain(&self, identity: &UserIdentity) -> SyncResult<ReplayReport> {
        let org = identity.organization_id;
        let actions = self.queue.pending(org)?;

        let mut report = ReplayReport {
            attempted: actions.len(),
            ..ReplayReport::default()
        };
        if actions.is_empty() {
            return Ok(report);
        }
        info!(count = actions.len(), "draining offline queue");

        for batch in actions.chunks(self.config.batch_size.max(1)) {
            let outcomes = join_all(
                batch
                    .iter()
                    .map(|action| self.replay_action(identity, action)),
            )
            .await;

            for outcome in outcomes {
                match outcome {
                    ActionOutcome::Applied => report.succeeded += 1,
                    ActionOutcome::Noop => report.noops += 1,
                    ActionOutcome::Conflict(resolved) => {
                        report.succeeded += 1;
                        report.conflicts.push(*resolved);
                    }
                    ActionOutcome::Retried => report.retried += 1,
                    ActionOutcome::PermanentFailure(id, error) => {
                        report.permanent_failures.push((id, error));
                    }
                }
            }
        }

        info!(
            succeeded = report.succeeded,
            retried = report.retried,
            conflicts = report.conflicts.len(),
            permanent = report.permanent_failures.len(),
            "drain finished"
        );
        Ok(report)
    }

    async fn replay_action(
        &self,
        identity: &UserIdentity,
        action: &OfflineAction,
    ) -> ActionOutcome {
        let org = identity.organization_id;
        let payload = EntityUpdatePayload {
            entity_type: action.entity_type.clone(),
            entity_id: action.entity_id.clone(),
            data: action.payload.clone(),
            base_version: action.base_version,
            action_id: action.id,
        };
        let payload = match serde_json::to_value(&payload) {
            Ok(value) => value,
            Err(e) => return self.fail_action(org, action, e.to_string()),
        };

        let ack = match self
            .transport
            .send(protocol::ENTITY_UPDATE, payload, true)
            .await
        {
            Ok(Some(ack)) => ack,
            Ok(None) => return self.fail_action(org, action, "missing acknowledgment".into()),
            Err(e) => return self.fail_action(org, action, e.to_string()),
        };

        let ack = match AckPayload::from_message(&ack) {
            Ok(parsed) => parsed,
            Err(e) => return self.fail_action(org, action, format!("bad ack payload: {e}")),
        };

        match ack.status {
            AckStatus::Ok => {
                if let Err(e) = self.queue.remove(org, action.id) {
                    warn!("failed to remove replayed action: {e}");
                }
                if let Some(server) = ack.server {
                    let key = CacheKey::new(&action.entity_type, &action.entity_id, org);
                    if let Err(e) = self.cache.put(&key, &server) {
                        warn!("failed to refresh cache after replay: {e}");
                    }
                }
                debug!(action = %action.id, "action replayed");
                ActionOutcome::Applied
            }
            AckStatus::Conflict => self.handle_conflict(identity, action, ack.server).await,
            AckStatus::Error => self.fail_action(
                org,
                action,
                ack.error.unwrap_or_else(|| "server rejected action".into()),
            ),
        }
    }

    /// The server holds a newer version: never reapply blindly. Detect the
    /// field-level divergence, resolve it, persist the merged snapshot,
    /// and push the resolved write.
    async fn handle_conflict(
        &self,
        identity: &UserIdentity,
        action: &OfflineAction,
        server: Option<EntitySnapshot>,
    ) -> ActionOutcome {
        let org = identity.organization_id;
        let Some(server) = server else {
            return self.fail_action(org, action, "conflict ack without server snapshot".into());
        };

        let key = CacheKey::new(&action.entity_type, &action.entity_id, org);
        // The client's assumed state: the cached snapshot (which carries
        // the offline edit), or one synthesized from the action itself.
        let client = match self.cache.get(&key) {
            Ok(Some(snapshot)) => snapshot,
            _ => EntitySnapshot::with_timestamp(
                action.payload.clone(),
                action.base_version,
                action.user_id,
                action.queued_at,
            ),
        };

        let Some(conflict) = self.resolver.detect_conflict(
            &action.entity_type,
            &action.entity_id,
            &client,
            &server,
        ) else {
            // The server already holds what we believe; a second replay
            // must be a no-op, not a double-apply.
            debug!(action = %action.id, "server state matches, dropping replay as no-op");
            if let Err(e) = self.cache.put(&key, &server) {
                warn!("failed to refresh cache: {e}");
            }
            if let Err(e) = self.queue.remove(org, action.id) {
                warn!("failed to remove no-op action: {e}");
            }
            return ActionOutcome::Noop;
        };

        let conflict = conflict.with_scope(org, identity.id);
        let result = self.resolver.resolve(&conflict);
        let merged = EntitySnapshot::new(result.data.clone(), server.version, identity.id);
        if let Err(e) = self.cache.put(&key, &merged) {
            warn!("failed to cache merged snapshot: {e}");
        }

        match self
            .api
            .put_entity(
                &action.entity_type,
                &action.entity_id,
                &result.data,
                &result.metadata,
            )
            .await
        {
            Ok(()) => {
                if let Err(e) = self.queue.remove(org, action.id) {
                    warn!("failed to remove resolved action: {e}");
                }
                info!(
                    action = %action.id,
                    resolved = result.conflicts_resolved,
                    remaining = result.conflicts_remaining.len(),
                    "conflict resolved during replay"
                );
                ActionOutcome::Conflict(Box::new((conflict, result)))
            }
            // The merged snapshot is cached; the retained action retries
            // the push on the next drain.
            Err(e) => self.fail_action(org, action, format!("resolved push failed: {e}")),
        }
    }

    /// Retains a failed action for the next drain, or drops it loudly once
    /// the attempt budget is spent.
    fn fail_action(&self, org: OrgId, action: &OfflineAction, error: String) -> ActionOutcome {
        let mut updated = action.clone();
        updated.record_failure(error.clone());

        if updated.attempts >= self.config.max_attempts {
            warn!(
                action = %action.id,
                attempts = updated.attempts,
                "action permanently failed: {error}"
            );
            if let Err(e) = self.queue.remove(org, action.id) {
                warn!("failed to remove dead action: {e}");
            }
            ActionOutcome::PermanentFailure(action.id, error)
        } else {
            debug!(
                action = %action.id,
                attempts = updated.attempts,
                "action failed, will retry: {error}"
            );
            if let Err(e) = self.queue.update(org, &updated) {
                warn!("failed to record action failure: {e}");
            }
            ActionOutcome::Retried
        }
    }
}
