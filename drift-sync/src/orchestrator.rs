//! The sync orchestrator.
//!
//! The only component with lifecycle and cross-cutting state: it owns the
//! transport connection, drains the offline queue, subscribes to remote
//! change topics, runs the periodic sync tick, reacts to host
//! connectivity transitions, and re-publishes everything as one unified
//! event stream.
//!
//! Constructed explicitly with injected collaborators — one long-lived
//! instance per application root, no global accessor — so tests can build
//! isolated orchestrators.

use crate::api::RemoteApi;
use crate::config::OrchestratorConfig;
use crate::connectivity::ConnectivitySource;
use crate::error::{SyncError, SyncResult};
use crate::events::{EventDispatcher, ListenerId, SyncEvent, SyncEventKind, SyncStatus};
use crate::identity::IdentityProvider;
use crate::protocol::{self, SubscribePayload};
use crate::replay::OfflineReplayer;
use crate::socket::SocketTransport;
use crate::transport::ConnectionState;
use chrono::{DateTime, Utc};
use drift_resolver::{ConflictResolver, Resolution, ResolutionRule};
use drift_store::{ActionQueue, CacheKey, EntityCache};
use drift_types::{EntitySnapshot, FieldMap, OfflineAction, WireMessage};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Sequences transport, queue replay, and conflict resolution across
/// startup, steady state, and network transitions.
pub struct SyncOrchestrator {
    config: OrchestratorConfig,
    transport: Arc<SocketTransport>,
    resolver: Arc<ConflictResolver>,
    cache: Arc<dyn EntityCache>,
    queue: Arc<dyn ActionQueue>,
    identity: Arc<dyn IdentityProvider>,
    connectivity: Arc<dyn ConnectivitySource>,
    replayer: OfflineReplayer,
    dispatcher: EventDispatcher,
    initialized: AtomicBool,
    // Non-reentrant drain guard: a tick or forceSync never re-enters a
    // sync cycle in progress.
    sync_guard: Mutex<()>,
    error_count: AtomicU32,
    conflicts_count: AtomicU64,
    last_sync: RwLock<Option<DateTime<Utc>>>,
    shutdown_tx: watch::Sender<bool>,
    // Self-handle for background tasks and scheduled retries.
    weak: Weak<Self>,
}

impl SyncOrchestrator {
    /// Creates an orchestrator over the given collaborators.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: OrchestratorConfig,
        transport: Arc<SocketTransport>,
        resolver: Arc<ConflictResolver>,
        cache: Arc<dyn EntityCache>,
        queue: Arc<dyn ActionQueue>,
        api: Arc<dyn RemoteApi>,
        identity: Arc<dyn IdentityProvider>,
        connectivity: Arc<dyn ConnectivitySource>,
    ) -> Arc<Self> {
        let replayer = OfflineReplayer::new(
            Arc::clone(&transport),
            Arc::clone(&resolver),
            Arc::clone(&cache),
            Arc::clone(&queue),
            api,
            config.replay.clone(),
        );
        let (shutdown_tx, _) = watch::channel(false);

        Arc::new_cyclic(|weak| Self {
            config,
            transport,
            resolver,
            cache,
            queue,
            identity,
            connectivity,
            replayer,
            dispatcher: EventDispatcher::new(),
            initialized: AtomicBool::new(false),
            sync_guard: Mutex::new(()),
            error_count: AtomicU32::new(0),
            conflicts_count: AtomicU64::new(0),
            last_sync: RwLock::new(None),
            shutdown_tx,
            weak: weak.clone(),
        })
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Starts the orchestrator: connects the transport, spawns the
    /// periodic sync timer, the realtime pump, and the connectivity
    /// listeners. Idempotent — a second call is a no-op.
    pub async fn initialize(&self) -> SyncResult<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            debug!("orchestrator already initialized");
            return Ok(());
        }
        info!("initializing sync orchestrator");

        self.transport.connect().await?;
        self.spawn_message_pump();
        self.spawn_state_pump();
        self.spawn_connectivity_pump();
        self.spawn_sync_timer();
        Ok(())
    }

    /// Whether [`initialize`](Self::initialize) has run.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Stops background tasks and disconnects the transport.
    pub async fn shutdown(&self) -> SyncResult<()> {
        info!("shutting down sync orchestrator");
        let _ = self.shutdown_tx.send(true);
        self.transport.disconnect().await?;
        Ok(())
    }

    // ── Sync cycles ──────────────────────────────────────────────

    /// Runs one sync cycle: drain the offline queue (offline mode), then
    /// (re)subscribe to remote change topics (real-time mode, host
    /// online). Skipped silently when a cycle is already running. On
    /// failure, retries are scheduled with exponential backoff up to the
    /// configured ceiling.
    pub async fn start_sync(&self) -> SyncResult<()> {
        let Ok(_guard) = self.sync_guard.try_lock() else {
            debug!("sync already in progress, skipping");
            return Ok(());
        };

        self.emit(SyncEventKind::SyncStarted);
        match self.run_sync_cycle().await {
            Ok(()) => {
                *self.last_sync.write().unwrap_or_else(|e| e.into_inner()) = Some(Utc::now());
                self.error_count.store(0, Ordering::SeqCst);
                self.emit(SyncEventKind::SyncCompleted {
                    pending_actions: self.pending_actions(),
                });
                Ok(())
            }
            Err(e) => {
                let errors = self.error_count.fetch_add(1, Ordering::SeqCst) + 1;
                warn!(error_count = errors, "sync cycle failed: {e}");
                self.emit(SyncEventKind::SyncFailed {
                    error: e.to_string(),
                    error_count: errors,
                });

                if errors < self.config.max_sync_retries {
                    let delay = Duration::from_secs(2u64.saturating_pow(errors.min(16)));
                    debug!(?delay, "scheduling sync retry");
                    self.schedule_retry(delay);
                } else {
                    warn!("sync retries exhausted");
                }
                Err(e)
            }
        }
    }

    /// Spawns a delayed retry of the sync cycle.
    ///
    /// Lives in its own method rather than inline in [`start_sync`](Self::start_sync)
    /// so the spawned task's `Send` requirement does not recursively
    /// reference `start_sync`'s own (opaque) future type, which the
    /// auto-trait solver cannot resolve.
    fn schedule_retry(&self, delay: Duration) {
        if let Some(this) = self.weak.upgrade() {
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = this.start_sync().await;
            });
        }
    }

    /// Manually triggered sync: resets the failure counter first so a
    /// user-initiated retry starts fresh.
    pub async fn force_sync(&self) -> SyncResult<()> {
        self.error_count.store(0, Ordering::SeqCst);
        self.start_sync().await
    }

    async fn run_sync_cycle(&self) -> SyncResult<()> {
        // Draining against a down socket would only queue duplicates of
        // the queue into the transport; replay waits for a connection.
        if self.config.offline_enabled && self.transport.state() == ConnectionState::Connected {
            if let Some(user) = self.identity.current_user() {
                let report = self.replayer.drain(&user).await?;
                for (conflict, result) in &report.conflicts {
                    self.conflicts_count.fetch_add(1, Ordering::SeqCst);
                    self.emit(SyncEventKind::ConflictDetected {
                        conflict: conflict.clone(),
                        unresolved_fields: result.conflicts_remaining.clone(),
                    });
                }
                for (action_id, error) in &report.permanent_failures {
                    // Loud, but not counted against the cycle retry
                    // counter: the cycle itself ran; the action is dead.
                    self.emit(SyncEventKind::SyncFailed {
                        error: format!("offline action {action_id} permanently failed: {error}"),
                        error_count: self.error_count.load(Ordering::SeqCst),
                    });
                }
            }
        }

        // Subscribing while the socket is down would park the cycle on a
        // queued send; the state pump re-runs a sync on reconnect anyway.
        if self.config.realtime_enabled
            && self.connectivity.is_online()
            && self.transport.state() == ConnectionState::Connected
            && !self.config.topics.is_empty()
        {
            let payload = serde_json::to_value(SubscribePayload {
                event_types: self.config.topics.clone(),
            })?;
            self.transport
                .send(protocol::SUBSCRIBE, payload, true)
                .await?;
            debug!(topics = self.config.topics.len(), "subscribed to change topics");
        }

        Ok(())
    }

    // ── Mutations ────────────────────────────────────────────────

    /// Records a mutation and gets it to the server.
    ///
    /// The action is queued durably first and applied to the local cache
    /// optimistically; delivery always goes through the queue drain, which
    /// preserves per-entity FIFO ordering whether or not the transport is
    /// currently connected.
    pub async fn submit_mutation(
        &self,
        entity_type: &str,
        entity_id: &str,
        changes: FieldMap,
    ) -> SyncResult<()> {
        let user = self.identity.current_user().ok_or(SyncError::NoIdentity)?;
        let org = user.organization_id;

        let key = CacheKey::new(entity_type, entity_id, org);
        let previous = self.cache.get(&key)?;
        let base_version = previous.as_ref().map_or(0, |s| s.version);

        let action = OfflineAction::new(
            entity_type,
            entity_id,
            changes.clone(),
            base_version,
            org,
            user.id,
        );
        self.queue.append(org, &action)?;

        let mut data = previous.map(|s| s.data).unwrap_or_default();
        data.extend(changes);
        self.cache
            .put(&key, &EntitySnapshot::new(data, base_version, user.id))?;

        if self.transport.state() == ConnectionState::Connected {
            let _ = self.start_sync().await;
        }
        Ok(())
    }

    // ── Events & status ──────────────────────────────────────────

    /// Registers a sync event listener.
    pub fn add_event_listener(
        &self,
        listener: impl Fn(&SyncEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        self.dispatcher.add_listener(listener)
    }

    /// Removes a listener. Returns whether it was registered.
    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        self.dispatcher.remove_listener(id)
    }

    /// Point-in-time status for the UI layer.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            is_online: self.connectivity.is_online(),
            connection_state: self.transport.state(),
            pending_actions: self.pending_actions(),
            last_sync_time: *self.last_sync.read().unwrap_or_else(|e| e.into_inner()),
            conflicts_count: self.conflicts_count.load(Ordering::SeqCst),
            error_count: self.error_count.load(Ordering::SeqCst),
        }
    }

    fn pending_actions(&self) -> usize {
        self.identity
            .current_user()
            .and_then(|u| self.queue.len(u.organization_id).ok())
            .unwrap_or(0)
    }

    fn emit(&self, kind: SyncEventKind) {
        self.dispatcher.emit(&SyncEvent::new(kind));
    }

    // ── Resolution policy passthrough ────────────────────────────

    /// Adds (or replaces) a resolution rule.
    pub fn add_rule(&self, rule: ResolutionRule) {
        self.resolver.add_rule(rule);
    }

    /// Removes a resolution rule.
    pub fn remove_rule(&self, entity_type: &str, field: &str) -> bool {
        self.resolver.remove_rule(entity_type, field)
    }

    /// Resets resolution policy to the built-in defaults.
    pub fn clear_rules(&self) {
        self.resolver.clear_rules();
    }

    /// Sets the fallback resolution for unruled fields.
    pub fn set_default_resolution(&self, resolution: Resolution) {
        self.resolver.set_default_resolution(resolution);
    }

    // ── Background tasks ─────────────────────────────────────────

    fn spawn_sync_timer(&self) {
        let Some(this) = self.weak.upgrade() else {
            return;
        };
        let mut shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut tick = interval(this.config.sync_interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        let _ = this.start_sync().await;
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        });
    }

    fn spawn_message_pump(&self) {
        let Some(this) = self.weak.upgrade() else {
            return;
        };
        let mut messages = self.transport.subscribe();
        let mut shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = messages.recv() => match received {
                        Ok(message) => this.apply_realtime(&message),
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(missed, "realtime pump lagged behind the socket");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        });
    }

    fn spawn_state_pump(&self) {
        let Some(this) = self.weak.upgrade() else {
            return;
        };
        let mut states = self.transport.state_changes();
        let mut shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = states.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let state = *states.borrow_and_update();
                        if state == ConnectionState::Connected {
                            if !this.connectivity.is_online() {
                                // Socket and host signals disagree; trust
                                // the socket.
                                debug!("transport connected while host reports offline");
                            }
                            let _ = this.start_sync().await;
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        });
    }

    fn spawn_connectivity_pump(&self) {
        let Some(this) = self.weak.upgrade() else {
            return;
        };
        let mut connectivity = self.connectivity.subscribe();
        let mut shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = connectivity.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let online = *connectivity.borrow_and_update();
                        if online {
                            info!("host reports online");
                            this.emit(SyncEventKind::OnlineDetected);
                            let _ = this.start_sync().await;
                        } else {
                            // Nothing destructive: in-flight state stays.
                            info!("host reports offline");
                            this.emit(SyncEventKind::OfflineDetected);
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Opportunistically writes `<entityType>_updated` broadcasts into the
    /// cache so offline reads stay fresh independent of replay.
    fn apply_realtime(&self, message: &WireMessage) {
        let Some(update) = protocol::parse_entity_update(message) else {
            return;
        };
        let Some(org) = message
            .organization_id
            .or_else(|| self.identity.current_user().map(|u| u.organization_id))
        else {
            debug!("realtime update without organization scope, ignoring");
            return;
        };

        let key = CacheKey::new(&update.entity_type, &update.entity_id, org);
        let previous = self.cache.get(&key).ok().flatten();

        let mut data = previous
            .as_ref()
            .map(|s| s.data.clone())
            .unwrap_or_default();
        data.extend(update.data.clone());

        let version = update
            .version
            .unwrap_or_else(|| previous.as_ref().map_or(1, |s| s.version + 1));
        let modified_by = message
            .user_id
            .or(previous.map(|s| s.modified_by))
            .unwrap_or_default();

        let snapshot = EntitySnapshot::new(data, version, modified_by);
        if let Err(e) = self.cache.put(&key, &snapshot) {
            warn!("realtime cache write failed: {e}");
            return;
        }
        debug!(
            entity_type = %update.entity_type,
            entity_id = %update.entity_id,
            version,
            "realtime update cached"
        );
    }
}
