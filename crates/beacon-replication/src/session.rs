//! # Replication Session
//!
//! What runs on each fresh channel.
//!
//! ## Session Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        One Session Attempt                              │
//! │                                                                         │
//! │  1. HANDSHAKE                                                          │
//! │     hello(own id, registry size) ──► first HelloReply                  │
//! │                                                                         │
//! │  2. SELF-LOOP CHECK                                                    │
//! │     reply.source_id == own id ──► close channel, end (no error)        │
//! │                                                                         │
//! │  3. STREAM                                                             │
//! │     LOCAL changes (snapshot, then live)                                │
//! │        Add / Modify ──► register(record)                               │
//! │        Delete       ──► unregister(record.id)                          │
//! │        Unknown      ──► logged, skipped                                │
//! │                                                                         │
//! │  The session fails on the first operation, change stream or channel    │
//! │  error. Records learned from other peers are never forwarded.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use beacon_core::{ChangeKind, ChangeNotification, InstanceInfo, Interest, Origin, SourceMatcher};
use beacon_registry::ChangeSource;
use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::channel::{OperationFuture, ReplicationChannel};
use crate::connection::SessionProgram;
use crate::error::{ReplicationError, ReplicationResult};
use crate::protocol::ReplicationHello;

/// Operations a session keeps outstanding before it stops reading changes.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 256;

/// Sender-side session: handshake, then push local changes.
pub struct ReplicationSession {
    own_id: String,
    source: Arc<dyn ChangeSource>,
    handshake_timeout: Option<Duration>,
    max_in_flight: usize,
}

impl ReplicationSession {
    pub fn new(own_id: &str, source: Arc<dyn ChangeSource>) -> Self {
        ReplicationSession {
            own_id: own_id.to_string(),
            source,
            handshake_timeout: None,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }

    /// Caps the operations awaiting completion. At the cap the session
    /// waits for the peer before taking the next change.
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    /// Fails the attempt if the peer has not answered the hello in time.
    pub fn with_handshake_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Exchanges hellos. Returns the peer's id, or `None` when the peer is
    /// this node and the channel has been closed.
    async fn handshake(&self, channel: &dyn ReplicationChannel) -> ReplicationResult<Option<String>> {
        let hello = ReplicationHello::new(&self.own_id, self.source.size().await);
        debug!(node_id = %self.own_id, registry_size = hello.registry_size, "Sending hello");

        let mut replies = channel.hello(hello);
        let first = match self.handshake_timeout {
            Some(limit) => tokio::time::timeout(limit, replies.next())
                .await
                .map_err(|_| ReplicationError::Timeout {
                    operation: "hello".to_string(),
                    millis: limit.as_millis() as u64,
                })?,
            None => replies.next().await,
        };

        let reply = match first {
            Some(reply) => reply?,
            None => {
                return Err(ReplicationError::HandshakeFailed(
                    "channel ended before the peer replied".into(),
                ))
            }
        };

        if reply.source_id == self.own_id {
            info!(node_id = %self.own_id, "Taking out replication connection to itself");
            channel.close();
            return Ok(None);
        }

        info!(node_id = %self.own_id, peer_id = %reply.source_id, "Replication handshake complete");
        Ok(Some(reply.source_id))
    }

    /// Streams local changes to the peer until something fails or the change
    /// stream ends.
    async fn replicate(&self, channel: &dyn ReplicationChannel, peer_id: &str) -> ReplicationResult<()> {
        let mut changes = self
            .source
            .stream_changes(Interest::for_full_registry(), SourceMatcher::for_origin(Origin::Local))
            .await?;
        let mut lifecycle = channel.lifecycle();
        let mut in_flight = FuturesUnordered::new();
        let mut dispatched: u64 = 0;

        loop {
            tokio::select! {
                result = &mut lifecycle => {
                    return Err(result.err().unwrap_or(ReplicationError::Disconnected));
                }
                Some(done) = in_flight.next(), if !in_flight.is_empty() => {
                    done?;
                }
                next = changes.next(), if in_flight.len() < self.max_in_flight => {
                    match next {
                        Some(Ok(notification)) => {
                            if let Some(op) = dispatch(channel, notification) {
                                in_flight.push(op);
                                dispatched += 1;
                            }
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => break,
                    }
                }
            }
        }

        while let Some(done) = in_flight.next().await {
            done?;
        }
        debug!(peer_id = %peer_id, dispatched, "Change stream ended");
        Ok(())
    }
}

/// Turns one change into the matching channel operation.
fn dispatch(
    channel: &dyn ReplicationChannel,
    notification: ChangeNotification<InstanceInfo>,
) -> Option<OperationFuture> {
    match notification.kind {
        ChangeKind::Add | ChangeKind::Modify => Some(channel.register(notification.data)),
        ChangeKind::Delete => Some(channel.unregister(&notification.data.id)),
        ChangeKind::Unknown => {
            warn!(id = %notification.data.id, "Unrecognised change notification kind");
            None
        }
    }
}

#[async_trait]
impl SessionProgram for ReplicationSession {
    async fn run(&self, channel: &dyn ReplicationChannel) -> ReplicationResult<()> {
        match self.handshake(channel).await? {
            Some(peer_id) => self.replicate(channel, &peer_id).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeChannel, Op, ScriptedChangeSource};
    use beacon_core::Source;
    use beacon_registry::{RegistryError, SourcedRegistry};

    fn instance(id: &str) -> InstanceInfo {
        InstanceInfo::new(id, "billing").with_address("billing-1", "10.0.0.5", 8080)
    }

    #[tokio::test]
    async fn test_self_loop_closes_without_operations() {
        let source = ScriptedChangeSource::new(vec![ChangeNotification::add(instance("x"))]);
        let session = ReplicationSession::new("node-a", Arc::new(source));
        let channel = FakeChannel::replying("node-a");

        session.run(&channel).await.unwrap();

        assert_eq!(channel.close_count(), 1);
        assert!(channel.ops().is_empty());
    }

    #[tokio::test]
    async fn test_different_peer_registers_once() {
        let source = ScriptedChangeSource::new(vec![ChangeNotification::add(instance("x"))]);
        let session = ReplicationSession::new("node-a", Arc::new(source));
        let channel = FakeChannel::replying("node-b");

        session.run(&channel).await.unwrap();

        assert_eq!(channel.ops(), vec![Op::Register("x".into())]);
        assert_eq!(channel.close_count(), 0);
        assert_eq!(channel.hellos()[0].sender_instance_id, "node-a");
    }

    #[tokio::test]
    async fn test_kind_mapping() {
        let mut unknown = ChangeNotification::add(instance("u"));
        unknown.kind = ChangeKind::Unknown;
        let source = ScriptedChangeSource::new(vec![
            ChangeNotification::add(instance("a")),
            ChangeNotification::modify(instance("a")),
            unknown,
            ChangeNotification::delete(instance("a")),
        ]);
        let session = ReplicationSession::new("node-a", Arc::new(source));
        let channel = FakeChannel::replying("node-b");

        session.run(&channel).await.unwrap();

        assert_eq!(
            channel.ops(),
            vec![
                Op::Register("a".into()),
                Op::Register("a".into()),
                Op::Unregister("a".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_only_local_records_are_replicated() {
        let registry = Arc::new(SourcedRegistry::new());
        registry.register(instance("mine"), Source::local()).await.unwrap();
        registry
            .register(instance("theirs"), Source::replicated("node-c"))
            .await
            .unwrap();

        let session = ReplicationSession::new("node-a", registry.clone());
        let channel = Arc::new(FakeChannel::replying("node-b"));

        let task = {
            let channel = channel.clone();
            tokio::spawn(async move { session.run(channel.as_ref()).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        registry
            .register(instance("theirs-2"), Source::replicated("node-c"))
            .await
            .unwrap();
        registry.register(instance("mine-2"), Source::local()).await.unwrap();
        registry.unregister("mine", &Source::local()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(
            channel.ops(),
            vec![
                Op::Register("mine".into()),
                Op::Register("mine-2".into()),
                Op::Unregister("mine".into()),
            ]
        );
        assert_eq!(channel.hellos()[0].registry_size, 2);
        task.abort();
    }

    #[tokio::test]
    async fn test_slow_peer_limits_outstanding_operations() {
        let changes = (0..10)
            .map(|n| ChangeNotification::add(instance(&format!("i-{}", n))))
            .collect();
        let source = ScriptedChangeSource::new(changes).then_pending();
        let session = ReplicationSession::new("node-a", Arc::new(source)).with_max_in_flight(3);
        let channel = Arc::new(FakeChannel::replying("node-b").stalled_operations());

        let task = {
            let channel = channel.clone();
            tokio::spawn(async move { session.run(channel.as_ref()).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(
            channel.ops(),
            vec![
                Op::Register("i-0".into()),
                Op::Register("i-1".into()),
                Op::Register("i-2".into()),
            ]
        );
        assert!(!task.is_finished());
        task.abort();
    }

    #[tokio::test]
    async fn test_missing_reply_fails_handshake() {
        let source = ScriptedChangeSource::new(vec![ChangeNotification::add(instance("x"))]);
        let session = ReplicationSession::new("node-a", Arc::new(source));
        let channel = FakeChannel::without_reply();

        let err = session.run(&channel).await.unwrap_err();
        assert!(matches!(err, ReplicationError::HandshakeFailed(_)));
        assert!(channel.ops().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_timeout() {
        let source = ScriptedChangeSource::new(Vec::new());
        let session = ReplicationSession::new("node-a", Arc::new(source))
            .with_handshake_timeout(Some(Duration::from_millis(250)));
        let channel = FakeChannel::silent();

        let err = session.run(&channel).await.unwrap_err();
        assert!(matches!(err, ReplicationError::Timeout { millis: 250, .. }));
    }

    #[tokio::test]
    async fn test_operation_failure_ends_session() {
        let source = ScriptedChangeSource::new(vec![
            ChangeNotification::add(instance("a")),
            ChangeNotification::add(instance("b")),
        ])
        .then_pending();
        let session = ReplicationSession::new("node-a", Arc::new(source));
        let channel = FakeChannel::replying("node-b").failing_operations();

        let err = session.run(&channel).await.unwrap_err();
        assert!(matches!(err, ReplicationError::Disconnected));
    }

    #[tokio::test]
    async fn test_change_stream_error_ends_session() {
        let source = ScriptedChangeSource::new(vec![ChangeNotification::add(instance("a"))])
            .then_error(RegistryError::Lagged(7));
        let session = ReplicationSession::new("node-a", Arc::new(source));
        let channel = FakeChannel::replying("node-b");

        let err = session.run(&channel).await.unwrap_err();
        assert!(matches!(err, ReplicationError::ChangeSource(RegistryError::Lagged(7))));
        assert_eq!(channel.ops(), vec![Op::Register("a".into())]);
    }

    #[tokio::test]
    async fn test_channel_termination_ends_session() {
        let source = ScriptedChangeSource::new(Vec::new()).then_pending();
        let session = ReplicationSession::new("node-a", Arc::new(source));
        let channel = Arc::new(FakeChannel::replying("node-b"));

        let task = {
            let channel = channel.clone();
            tokio::spawn(async move { session.run(channel.as_ref()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        channel.terminate();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, ReplicationError::Disconnected));
    }
}
