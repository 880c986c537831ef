//! The socket transport: one long-lived duplex connection with
//! reconnection, heartbeats, an outbound queue for disconnected sends, and
//! a pending-acknowledgment table for confirmed sends.
//!
//! The [`SocketTransport`] handle is cheap to share; all mutable state (the
//! socket halves, the pending-ack table, the outbound queue) is owned
//! exclusively by a spawned event loop that the handle drives over a
//! command channel. Connection state is published on a watch channel;
//! non-control messages fan out on a broadcast channel in arrival order.

use crate::config::TransportConfig;
use crate::error::{TransportError, TransportResult};
use crate::identity::IdentityProvider;
use crate::protocol::{self, AckPayload, AckStatus};
use crate::transport::{Connection, ConnectionState, Connector, MessageSink, MessageStream};
use drift_types::{MessageId, WireMessage};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{interval, sleep_until, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// How often the loop checks pending acks for expiry.
const ACK_SWEEP_INTERVAL: Duration = Duration::from_millis(250);

type SendReply = oneshot::Sender<TransportResult<Option<WireMessage>>>;

enum Command {
    Connect {
        reply: oneshot::Sender<()>,
    },
    Send {
        message: WireMessage,
        require_ack: bool,
        reply: SendReply,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
}

struct PendingAck {
    reply: SendReply,
    deadline: Instant,
}

struct OutboundSend {
    message: WireMessage,
    /// Present for confirmed sends; fire-and-forget sends resolve at
    /// queue time.
    reply: Option<SendReply>,
}

/// Handle onto the socket transport.
pub struct SocketTransport {
    command_tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    incoming_tx: broadcast::Sender<WireMessage>,
    identity: Option<Arc<dyn IdentityProvider>>,
}

impl SocketTransport {
    /// Creates the transport and spawns its event loop. The loop starts
    /// idle; nothing connects until [`connect`](Self::connect) is called.
    #[must_use]
    pub fn spawn(config: TransportConfig, connector: Arc<dyn Connector>) -> Self {
        let (command_tx, command_rx) = mpsc::channel(64);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (incoming_tx, _) = broadcast::channel(256);

        let event_loop = EventLoop {
            config,
            connector,
            command_rx,
            state_tx,
            incoming_tx: incoming_tx.clone(),
            pending: HashMap::new(),
            outbound: VecDeque::new(),
            attempts: 0,
            want_connected: false,
            last_heartbeat_response: Instant::now(),
        };
        tokio::spawn(event_loop.run());

        Self {
            command_tx,
            state_rx,
            incoming_tx,
            identity: None,
        }
    }

    /// Stamps outgoing messages with the current user's identity.
    #[must_use]
    pub fn with_identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Initiates a connection. Idempotent while connected or already
    /// trying; re-arms reconnection after the attempt budget was
    /// exhausted. Progress is observable via
    /// [`state_changes`](Self::state_changes).
    pub async fn connect(&self) -> TransportResult<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(Command::Connect { reply: reply_tx })
            .await
            .map_err(|_| TransportError::ChannelClosed)?;
        reply_rx.await.map_err(|_| TransportError::ChannelClosed)
    }

    /// Cleanly shuts the connection down. Every pending acknowledgment and
    /// queued confirmed send is failed with a connection-closed error
    /// before this returns — no caller is left awaiting forever.
    pub async fn disconnect(&self) -> TransportResult<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(Command::Disconnect { reply: reply_tx })
            .await
            .map_err(|_| TransportError::ChannelClosed)?;
        reply_rx.await.map_err(|_| TransportError::ChannelClosed)
    }

    /// Sends a message, stamping the current identity onto it.
    ///
    /// Connected: the message is transmitted immediately; with
    /// `require_ack` the returned future resolves with the ack message (or
    /// fails after the ack timeout). Disconnected: the message joins the
    /// outbound queue; without `require_ack` the future resolves
    /// optimistically right away (loss on forced teardown is accepted for
    /// fire-and-forget sends).
    pub async fn send(
        &self,
        msg_type: &str,
        payload: serde_json::Value,
        require_ack: bool,
    ) -> TransportResult<Option<WireMessage>> {
        let mut message = WireMessage::new(msg_type, payload);
        if let Some(identity) = &self.identity {
            if let Some(user) = identity.current_user() {
                message = message.with_identity(user.organization_id, user.id);
            }
        }
        self.send_message(message, require_ack).await
    }

    /// Sends a pre-built message. See [`send`](Self::send).
    pub async fn send_message(
        &self,
        message: WireMessage,
        require_ack: bool,
    ) -> TransportResult<Option<WireMessage>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(Command::Send {
                message,
                require_ack,
                reply: reply_tx,
            })
            .await
            .map_err(|_| TransportError::ChannelClosed)?;
        reply_rx.await.map_err(|_| TransportError::ChannelClosed)?
    }

    /// The current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch channel yielding every connection state transition.
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Broadcast of forwarded messages (everything that is not transport
    /// control), in socket-arrival order.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<WireMessage> {
        self.incoming_tx.subscribe()
    }
}

// ── Event loop ───────────────────────────────────────────────────

enum Event {
    Incoming(Option<TransportResult<WireMessage>>),
    Command(Option<Command>),
    HeartbeatTick,
    BackoffElapsed,
    Sweep,
}

struct EventLoop {
    config: TransportConfig,
    connector: Arc<dyn Connector>,
    command_rx: mpsc::Receiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    incoming_tx: broadcast::Sender<WireMessage>,
    pending: HashMap<MessageId, PendingAck>,
    outbound: VecDeque<OutboundSend>,
    attempts: u32,
    want_connected: bool,
    last_heartbeat_response: Instant,
}

impl EventLoop {
    async fn run(mut self) {
        let mut conn: Option<Connection> = None;
        let mut reconnect_at: Option<Instant> = None;
        let mut heartbeat = interval(self.config.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sweep = interval(ACK_SWEEP_INTERVAL);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let event = if let Some(active) = conn.as_mut() {
                let stream = &mut active.1;
                tokio::select! {
                    incoming = stream.next() => Event::Incoming(incoming),
                    command = self.command_rx.recv() => Event::Command(command),
                    _ = heartbeat.tick() => Event::HeartbeatTick,
                    _ = sweep.tick() => Event::Sweep,
                }
            } else {
                tokio::select! {
                    command = self.command_rx.recv() => Event::Command(command),
                    _ = sleep_until_opt(reconnect_at), if reconnect_at.is_some() => {
                        Event::BackoffElapsed
                    }
                    _ = sweep.tick() => Event::Sweep,
                }
            };

            match event {
                Event::Incoming(Some(Ok(message))) => self.dispatch(message),
                Event::Incoming(Some(Err(e))) => {
                    // Errors are reported but the close that follows is
                    // what schedules reconnection.
                    warn!("socket error: {e}");
                    self.set_state(ConnectionState::Error);
                    conn = None;
                    reconnect_at = self.schedule_reconnect();
                }
                Event::Incoming(None) => {
                    info!("connection closed by remote");
                    conn = None;
                    reconnect_at = self.schedule_reconnect();
                }

                Event::Command(None) => {
                    // Transport handle dropped: settle everything and stop.
                    if let Some(active) = conn.as_mut() {
                        let _ = active.0.close().await;
                    }
                    self.settle_outstanding();
                    self.set_state(ConnectionState::Disconnected);
                    return;
                }
                Event::Command(Some(Command::Connect { reply })) => {
                    let _ = reply.send(());
                    if conn.is_none() && !self.want_connected {
                        self.want_connected = true;
                        self.attempts = 0;
                        self.set_state(ConnectionState::Connecting);
                        conn = self.try_connect().await;
                        match conn.as_mut() {
                            Some(active) => {
                                self.flush_outbound(&mut active.0).await;
                                heartbeat.reset();
                            }
                            None => reconnect_at = self.schedule_reconnect(),
                        }
                    }
                }
                Event::Command(Some(Command::Send {
                    message,
                    require_ack,
                    reply,
                })) => match conn.as_mut() {
                    Some(active) => {
                        self.transmit(&mut active.0, message, require_ack, reply)
                            .await;
                    }
                    None => self.enqueue(message, require_ack, reply),
                },
                Event::Command(Some(Command::Disconnect { reply })) => {
                    if let Some(active) = conn.as_mut() {
                        let _ = active.0.close().await;
                    }
                    conn = None;
                    self.want_connected = false;
                    reconnect_at = None;
                    self.settle_outstanding();
                    self.set_state(ConnectionState::Disconnected);
                    let _ = reply.send(());
                }

                Event::HeartbeatTick => {
                    if conn.is_none() {
                        // Stale tick raced a disconnect.
                    } else if self.last_heartbeat_response.elapsed()
                        >= self.config.heartbeat_interval * 2
                    {
                        // The socket looks open but nothing is coming back
                        // (half-open connection). Force a close and retry.
                        warn!("no heartbeat response within liveness window, forcing close");
                        if let Some(active) = conn.as_mut() {
                            let _ = active.0.close().await;
                        }
                        conn = None;
                        reconnect_at = self.schedule_reconnect();
                    } else if let Some(active) = conn.as_mut() {
                        let probe = WireMessage::new(protocol::HEARTBEAT, json!({}));
                        if let Err(e) = active.0.send(&probe).await {
                            warn!("heartbeat send failed: {e}");
                        }
                    }
                }

                Event::BackoffElapsed => {
                    reconnect_at = None;
                    conn = self.try_connect().await;
                    match conn.as_mut() {
                        Some(active) => {
                            self.flush_outbound(&mut active.0).await;
                            heartbeat.reset();
                        }
                        None => reconnect_at = self.schedule_reconnect(),
                    }
                }

                Event::Sweep => self.expire_pending(),
            }
        }
    }

    /// One connection attempt, bounded by the establishment timeout.
    async fn try_connect(&mut self) -> Option<Connection> {
        debug!(endpoint = %self.config.endpoint, "connecting");
        match timeout(
            self.config.connect_timeout,
            self.connector.connect(&self.config.endpoint),
        )
        .await
        {
            Ok(Ok(connection)) => {
                info!("socket connected");
                self.attempts = 0;
                self.last_heartbeat_response = Instant::now();
                self.set_state(ConnectionState::Connected);
                Some(connection)
            }
            Ok(Err(e)) => {
                warn!("connect failed: {e}");
                None
            }
            Err(_) => {
                warn!(
                    "connect timed out after {:?}",
                    self.config.connect_timeout
                );
                None
            }
        }
    }

    /// Schedules the next reconnect attempt with capped exponential
    /// backoff, or gives up once the attempt budget is spent.
    fn schedule_reconnect(&mut self) -> Option<Instant> {
        if !self.want_connected {
            self.set_state(ConnectionState::Disconnected);
            return None;
        }
        if self.attempts >= self.config.max_reconnect_attempts {
            warn!(
                attempts = self.attempts,
                "reconnect attempts exhausted, staying disconnected"
            );
            self.want_connected = false;
            self.set_state(ConnectionState::Disconnected);
            return None;
        }

        let delay = self
            .config
            .reconnect_base_delay
            .saturating_mul(2u32.saturating_pow(self.attempts.min(16)))
            .min(self.config.reconnect_max_delay);
        self.attempts += 1;
        self.set_state(ConnectionState::Reconnecting);
        debug!(attempt = self.attempts, ?delay, "reconnect scheduled");
        Some(Instant::now() + delay)
    }

    /// Routes one incoming message: heartbeat responses refresh liveness,
    /// acks settle their pending entry, everything else is forwarded.
    fn dispatch(&mut self, message: WireMessage) {
        match message.msg_type.as_str() {
            protocol::HEARTBEAT_RESPONSE => {
                self.last_heartbeat_response = Instant::now();
            }
            protocol::ACK => {
                let Some(pending) = self.pending.remove(&message.message_id) else {
                    debug!(id = %message.message_id, "ack without pending entry");
                    return;
                };
                let outcome = match AckPayload::from_message(&message) {
                    Ok(payload) if payload.status == AckStatus::Error => {
                        Err(TransportError::Rejected(
                            payload.error.unwrap_or_else(|| "unspecified".to_string()),
                        ))
                    }
                    _ => Ok(Some(message)),
                };
                let _ = pending.reply.send(outcome);
            }
            _ => {
                let _ = self.incoming_tx.send(message);
            }
        }
    }

    /// Transmits on an open socket. A send error rejects this send's
    /// future only; the socket stays up (its close event, if the error was
    /// fatal, arrives via the stream).
    async fn transmit(
        &mut self,
        sink: &mut Box<dyn MessageSink>,
        message: WireMessage,
        require_ack: bool,
        reply: SendReply,
    ) {
        let message_id = message.message_id;
        match sink.send(&message).await {
            Ok(()) => {
                if require_ack {
                    self.pending.insert(
                        message_id,
                        PendingAck {
                            reply,
                            deadline: Instant::now() + self.config.ack_timeout,
                        },
                    );
                } else {
                    let _ = reply.send(Ok(None));
                }
            }
            Err(e) => {
                let _ = reply.send(Err(e));
            }
        }
    }

    /// Queues a message while disconnected.
    fn enqueue(&mut self, message: WireMessage, require_ack: bool, reply: SendReply) {
        debug!(msg_type = %message.msg_type, "queueing message while disconnected");
        if require_ack {
            self.outbound.push_back(OutboundSend {
                message,
                reply: Some(reply),
            });
        } else {
            let _ = reply.send(Ok(None));
            self.outbound.push_back(OutboundSend {
                message,
                reply: None,
            });
        }
    }

    /// Flushes the outbound queue after a (re)connect. Confirmed sends get
    /// their pending-ack entry — and their timeout — at flush time.
    async fn flush_outbound(&mut self, sink: &mut Box<dyn MessageSink>) {
        if !self.outbound.is_empty() {
            info!(queued = self.outbound.len(), "flushing outbound queue");
        }
        while let Some(item) = self.outbound.pop_front() {
            let message_id = item.message.message_id;
            match sink.send(&item.message).await {
                Ok(()) => {
                    if let Some(reply) = item.reply {
                        self.pending.insert(
                            message_id,
                            PendingAck {
                                reply,
                                deadline: Instant::now() + self.config.ack_timeout,
                            },
                        );
                    }
                }
                Err(e) => {
                    warn!("flush send failed: {e}");
                    if let Some(reply) = item.reply {
                        let _ = reply.send(Err(e));
                    }
                }
            }
        }
    }

    /// Fails pending acks whose deadline passed.
    fn expire_pending(&mut self) {
        let now = Instant::now();
        let expired: Vec<MessageId> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            if let Some(pending) = self.pending.remove(&id) {
                debug!(%id, "acknowledgment timed out");
                let _ = pending.reply.send(Err(TransportError::AckTimeout));
            }
        }
    }

    /// Fails every pending ack and queued confirmed send. Called on clean
    /// disconnect and final shutdown — nothing may be left hanging.
    fn settle_outstanding(&mut self) {
        for (_, pending) in self.pending.drain() {
            let _ = pending.reply.send(Err(TransportError::ConnectionClosed));
        }
        for item in self.outbound.drain(..) {
            if let Some(reply) = item.reply {
                let _ = reply.send(Err(TransportError::ConnectionClosed));
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                debug!(?current, ?state, "connection state change");
                *current = state;
                true
            }
        });
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        // Guarded out by the caller's `if`; never polled.
        None => std::future::pending().await,
    }
}
