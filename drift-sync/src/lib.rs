//! Socket transport, offline replay, and sync orchestration for drift.
//!
//! This crate keeps a client-side cache consistent with a remote
//! authoritative store under unreliable connectivity.
//!
//! # Architecture
//!
//! - **Transport** ([`SocketTransport`]): one long-lived duplex socket
//!   with reconnection (capped exponential backoff), heartbeat liveness
//!   probing, an outbound queue for disconnected sends, and a pending-ack
//!   table for confirmed sends.
//! - **Replay** ([`OfflineReplayer`]): drains the durable offline action
//!   queue in FIFO batches once connectivity returns, routing diverged
//!   entities through the conflict resolver.
//! - **Orchestrator** ([`SyncOrchestrator`]): the single lifecycle owner —
//!   startup, the periodic sync tick, connectivity transitions, realtime
//!   cache updates, and the unified event stream.
//!
//! Conflict detection/resolution lives in `drift-resolver`; the local
//! store interface in `drift-store`.
//!
//! # Example
//!
//! ```no_run
//! use drift_sync::{
//!     ManualConnectivity, OrchestratorConfig, SocketTransport, StaticIdentity,
//!     SyncOrchestrator, TransportConfig, WsConnector, HttpRemoteApi,
//! };
//! use drift_resolver::ConflictResolver;
//! use drift_store::MemoryStore;
//! use drift_types::{OrgId, UserId};
//! use std::sync::Arc;
//!
//! # async fn example() -> drift_sync::SyncResult<()> {
//! let identity = Arc::new(StaticIdentity::new(UserId::new(), OrgId::new()));
//! let transport = Arc::new(
//!     SocketTransport::spawn(TransportConfig::default(), Arc::new(WsConnector::new()))
//!         .with_identity(identity.clone()),
//! );
//! let store = Arc::new(MemoryStore::new());
//!
//! let orchestrator = SyncOrchestrator::new(
//!     OrchestratorConfig::default(),
//!     transport,
//!     Arc::new(ConflictResolver::new()),
//!     store.clone(),
//!     store,
//!     Arc::new(HttpRemoteApi::new("https://api.example.com")?),
//!     identity,
//!     Arc::new(ManualConnectivity::new(true)),
//! );
//! orchestrator.initialize().await?;
//! # Ok(())
//! # }
//! ```

mod api;
mod config;
mod connectivity;
mod error;
mod events;
mod identity;
mod orchestrator;
pub mod protocol;
mod replay;
mod socket;
pub mod transport;
mod ws;

pub use api::{HttpRemoteApi, RemoteApi};
pub use config::{OrchestratorConfig, ReplayConfig, TransportConfig};
pub use connectivity::{ConnectivitySource, ManualConnectivity};
pub use error::{SyncError, SyncResult, TransportError, TransportResult};
pub use events::{EventDispatcher, ListenerId, SyncEvent, SyncEventKind, SyncStatus};
pub use identity::{IdentityProvider, StaticIdentity, UserIdentity};
pub use orchestrator::SyncOrchestrator;
pub use replay::{OfflineReplayer, ReplayReport};
pub use socket::SocketTransport;
pub use transport::{ConnectionState, Connector, MessageSink, MessageStream};
pub use ws::WsConnector;
