//! # Replication Handler
//!
//! Owns the replication lifecycle towards one peer.
//!
//! ## Handler Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     ReplicationHandler Architecture                     │
//! │                                                                         │
//! │   ┌──────┐  start_replication()  ┌─────────────┐  shutdown()  ┌──────┐  │
//! │   │ Idle │ ────────────────────► │ Replicating │ ───────────► │Closed│  │
//! │   └──┬───┘                       └─────────────┘              └──────┘  │
//! │      │                 shutdown()                                ▲      │
//! │      └───────────────────────────────────────────────────────────┘      │
//! │                                                                         │
//! │   Replicating spawns one terminal observer:                            │
//! │                                                                         │
//! │   observer ──► RetryableConnection ──► ChannelFactory ──► peer         │
//! │                  (retry policy)          (WebSocket)                    │
//! │                                                                         │
//! │   shutdown() from Replicating:                                         │
//! │     1. cancel the observer                                             │
//! │     2. close the connection (and the open channel)                     │
//! │     3. shut the factory down                                           │
//! │   shutdown() from any other state only marks the handler Closed.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The state is the only concurrently mutated field and only changes through
//! compare-and-set or swap, so `start_replication` and `shutdown` can race
//! freely from any thread.

use beacon_registry::ChangeSource;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channel::ChannelFactory;
use crate::config::{PeerConfig, ReplicationConfig, ReplicationSettings, RetrySettings};
use crate::connection::RetryableConnection;
use crate::session::ReplicationSession;
use crate::transport::{TransportConfig, WebSocketChannelFactory};

// =============================================================================
// Handler State
// =============================================================================

/// Lifecycle state of a [`ReplicationHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandlerState {
    Idle = 0,
    Replicating = 1,
    Closed = 2,
}

impl HandlerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => HandlerState::Idle,
            1 => HandlerState::Replicating,
            _ => HandlerState::Closed,
        }
    }
}

impl std::fmt::Display for HandlerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerState::Idle => write!(f, "idle"),
            HandlerState::Replicating => write!(f, "replicating"),
            HandlerState::Closed => write!(f, "closed"),
        }
    }
}

struct AtomicHandlerState(AtomicU8);

impl AtomicHandlerState {
    fn new() -> Self {
        AtomicHandlerState(AtomicU8::new(HandlerState::Idle as u8))
    }

    fn load(&self) -> HandlerState {
        HandlerState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn compare_and_set(&self, from: HandlerState, to: HandlerState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Stores `to` and returns the previous state.
    fn swap(&self, to: HandlerState) -> HandlerState {
        HandlerState::from_u8(self.0.swap(to as u8, Ordering::AcqRel))
    }
}

// =============================================================================
// Replication Handler
// =============================================================================

/// Sender-side replication towards one peer.
///
/// ## Usage
/// ```rust,ignore
/// let handler = ReplicationHandler::new(&config, &config.peers[0], registry.clone());
/// handler.start_replication();
///
/// // ...
///
/// handler.shutdown();
/// ```
pub struct ReplicationHandler {
    node_id: String,
    peer: String,
    state: AtomicHandlerState,
    connection: Arc<RetryableConnection>,
    factory: Arc<dyn ChannelFactory>,
    retry: RetrySettings,
    subscription: CancellationToken,
}

impl ReplicationHandler {
    /// Creates a handler replicating to `peer` over WebSocket.
    pub fn new(config: &ReplicationConfig, peer: &PeerConfig, source: Arc<dyn ChangeSource>) -> Self {
        let factory = Arc::new(WebSocketChannelFactory::new(TransportConfig::for_peer(
            peer,
            &config.replication,
        )));
        Self::with_factory(
            factory,
            config.node_id(),
            &peer.label(),
            &config.replication,
            source,
        )
    }

    /// Creates a handler on top of any channel factory.
    pub fn with_factory(
        factory: Arc<dyn ChannelFactory>,
        node_id: &str,
        peer: &str,
        settings: &ReplicationSettings,
        source: Arc<dyn ChangeSource>,
    ) -> Self {
        let session = ReplicationSession::new(node_id, source)
            .with_handshake_timeout(settings.handshake_timeout());
        let connection = RetryableConnection::new(factory.clone(), Arc::new(session));

        ReplicationHandler {
            node_id: node_id.to_string(),
            peer: peer.to_string(),
            state: AtomicHandlerState::new(),
            connection: Arc::new(connection),
            factory,
            retry: settings.retry.clone(),
            subscription: CancellationToken::new(),
        }
    }

    /// Starts replicating. Only the first call on an idle handler has any
    /// effect; it spawns the retry loop on the current Tokio runtime.
    ///
    /// Called outside a runtime, it logs a warning and leaves the handler
    /// idle so a later call from inside a runtime can still start it.
    pub fn start_replication(&self) {
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(peer = %self.peer, error = %e, "Cannot start replication outside a Tokio runtime");
                return;
            }
        };

        if !self
            .state
            .compare_and_set(HandlerState::Idle, HandlerState::Replicating)
        {
            debug!(peer = %self.peer, state = %self.state.load(), "Replication already started or closed");
            return;
        }

        info!(
            node_id = %self.node_id,
            peer = %self.peer,
            strategy = %self.retry.strategy,
            wait_ms = self.retry.wait_ms,
            "Starting sender replication"
        );

        let connection = self.connection.clone();
        let policy = self.retry.build_policy();
        let subscription = self.subscription.clone();
        let peer = self.peer.clone();

        runtime.spawn(async move {
            tokio::select! {
                _ = subscription.cancelled() => {
                    debug!(peer = %peer, "Replication observer cancelled");
                }
                result = connection.run_with_retry(policy) => {
                    match result {
                        Ok(()) => info!(peer = %peer, "Sender replication connection completed"),
                        Err(e) => warn!(peer = %peer, error = %e, "Sender replication connection terminated with error"),
                    }
                }
            }
        });
    }

    /// Stops replicating. Teardown happens once, and only if replication was
    /// running; every later call is a no-op.
    pub fn shutdown(&self) {
        let previous = self.state.swap(HandlerState::Closed);
        if previous != HandlerState::Replicating {
            return;
        }

        info!(node_id = %self.node_id, peer = %self.peer, "Shutting down sender replication");
        self.subscription.cancel();
        self.connection.close();
        self.factory.shutdown();
    }

    #[cfg(test)]
    fn state(&self) -> HandlerState {
        self.state.load()
    }
}

impl Drop for ReplicationHandler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
