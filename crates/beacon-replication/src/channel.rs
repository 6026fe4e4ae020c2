//! # Replication Channel Abstractions
//!
//! The seam between the replication lifecycle and the wire.
//!
//! ```text
//! ┌────────────────────┐  new_channel()   ┌────────────────────────────────┐
//! │ RetryableConnection│ ───────────────► │ ChannelFactory                 │
//! └─────────┬──────────┘                  │  (one per peer; shutdown once) │
//!           │                             └───────────────┬────────────────┘
//!           │ session program                             │ creates
//!           ▼                                             ▼
//! ┌────────────────────┐  hello / register / unregister / close
//! │ ReplicationSession │ ───────────────────────────────────────► Channel
//! └────────────────────┘
//! ```
//!
//! A channel is used for exactly one session attempt. Operations are
//! **dispatched when called**: the returned future only reports completion,
//! so two operations called in order reach the peer in that order even if
//! their futures are polled out of order.

use async_trait::async_trait;
use beacon_core::InstanceInfo;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use std::sync::Arc;

use crate::error::ReplicationResult;
use crate::protocol::{ReplicationHello, ReplicationHelloReply};

/// Replies to a hello. Callers use only the first item.
pub type HelloReplyStream = BoxStream<'static, ReplicationResult<ReplicationHelloReply>>;

/// Completion of a dispatched operation.
pub type OperationFuture = BoxFuture<'static, ReplicationResult<()>>;

/// One replication session with a peer.
pub trait ReplicationChannel: Send + Sync {
    /// Sends the handshake. The stream ends without an item if the channel
    /// goes away before the peer answers.
    fn hello(&self, hello: ReplicationHello) -> HelloReplyStream;

    /// Upserts `instance` on the peer.
    fn register(&self, instance: InstanceInfo) -> OperationFuture;

    /// Removes the record with `id` from the peer.
    fn unregister(&self, id: &str) -> OperationFuture;

    /// Closes the channel. Idempotent.
    fn close(&self);

    /// Resolves once the channel has terminated: `Ok` when it was closed
    /// locally, `Err` when the peer or the transport ended it.
    ///
    /// Channels with no background activity never terminate on their own.
    fn lifecycle(&self) -> OperationFuture {
        Box::pin(futures_util::future::pending())
    }
}

/// Produces channels to a single peer.
#[async_trait]
pub trait ChannelFactory: Send + Sync {
    /// Opens a new channel. Fails if the peer cannot be reached or the
    /// factory has been shut down.
    async fn new_channel(&self) -> ReplicationResult<Arc<dyn ReplicationChannel>>;

    /// Releases factory resources and closes channels it still tracks.
    /// Idempotent.
    fn shutdown(&self);
}
