//! # beacon-replication: Sender-Side Peer Replication
//!
//! Pushes a write node's own registrations to a peer write node and keeps
//! doing so across disconnects, restarts and misconfiguration.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Sender Replication Architecture                      │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │              ReplicationHandler (one per peer)                   │  │
//! │  │                                                                  │  │
//! │  │  Idle ─► Replicating ─► Closed   (atomic, start/shutdown once)   │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │                               ▼                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │              RetryableConnection                                 │  │
//! │  │  fresh channel per attempt, RetryPolicy between attempts        │  │
//! │  └──────────────┬─────────────────────────────────┬─────────────────┘  │
//! │                 ▼                                 ▼                     │
//! │  ┌────────────────────────────┐   ┌────────────────────────────────┐   │
//! │  │ ReplicationSession         │   │ WebSocketChannelFactory        │   │
//! │  │ hello, self-loop check,    │   │ WebSocketChannel               │   │
//! │  │ LOCAL changes → operations │   │ (JSON protocol messages)       │   │
//! │  └──────────────┬─────────────┘   └────────────────────────────────┘   │
//! │                 │                                                       │
//! │                 ▼                                                       │
//! │  ┌────────────────────────────┐                                        │
//! │  │ ChangeSource               │  (beacon-registry)                     │
//! │  └────────────────────────────┘                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`handler`] - `ReplicationHandler` lifecycle state machine
//! - [`connection`] - `RetryableConnection` and the `SessionProgram` seam
//! - [`session`] - handshake and change-to-operation streaming
//! - [`retry`] - fixed and exponential retry policies
//! - [`channel`] - `ReplicationChannel` / `ChannelFactory` traits
//! - [`transport`] - WebSocket implementation of the channel traits
//! - [`protocol`] - wire messages
//! - [`config`] - TOML + environment configuration
//! - [`error`] - replication error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use beacon_replication::{ReplicationConfig, ReplicationHandler};
//! use beacon_registry::SourcedRegistry;
//!
//! let config = ReplicationConfig::load(None)?;
//! let registry = Arc::new(SourcedRegistry::new());
//!
//! let handlers: Vec<_> = config
//!     .peers
//!     .iter()
//!     .map(|peer| ReplicationHandler::new(&config, peer, registry.clone()))
//!     .collect();
//! handlers.iter().for_each(ReplicationHandler::start_replication);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod channel;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod retry;
pub mod session;
pub mod transport;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use channel::{ChannelFactory, HelloReplyStream, OperationFuture, ReplicationChannel};
pub use config::{
    NodeConfig, PeerConfig, ReplicationConfig, ReplicationSettings, RetrySettings, RetryStrategy,
    DEFAULT_RETRY_WAIT_MS,
};
pub use connection::{RetryableConnection, SessionProgram};
pub use error::{ReplicationError, ReplicationResult};
pub use handler::{HandlerState, ReplicationHandler};
pub use protocol::{ReplicationHello, ReplicationHelloReply, ReplicationMessage, PROTOCOL_VERSION};
pub use retry::{ExponentialDelay, FixedDelay, RetryPolicy};
pub use session::{ReplicationSession, DEFAULT_MAX_IN_FLIGHT};
pub use transport::{ChannelState, TransportConfig, WebSocketChannel, WebSocketChannelFactory};
