//! Test doubles shared by the module tests: an in-memory channel and
//! factory, a scripted change source, and a WebSocket peer served by axum.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use beacon_core::{ChangeNotification, InstanceInfo, Interest, SourceMatcher};
use beacon_registry::{ChangeSource, ChangeStream, RegistryError, RegistryResult};
use futures_util::{future, stream, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::channel::{ChannelFactory, HelloReplyStream, OperationFuture, ReplicationChannel};
use crate::error::{ReplicationError, ReplicationResult};
use crate::protocol::{ReplicationHello, ReplicationHelloReply, ReplicationMessage};

// =============================================================================
// Fake Channel
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Op {
    Register(String),
    Unregister(String),
}

enum HelloBehaviour {
    Reply(String),
    EndWithoutReply,
    Silent,
}

#[derive(Clone, Copy)]
enum OpOutcome {
    Succeed,
    Fail,
    Stall,
}

pub(crate) struct FakeChannel {
    hello: HelloBehaviour,
    op_outcome: OpOutcome,
    hellos: Mutex<Vec<ReplicationHello>>,
    ops: Mutex<Vec<Op>>,
    closes: AtomicUsize,
    terminated: watch::Sender<bool>,
}

impl FakeChannel {
    fn with_behaviour(hello: HelloBehaviour) -> Self {
        FakeChannel {
            hello,
            op_outcome: OpOutcome::Succeed,
            hellos: Mutex::new(Vec::new()),
            ops: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
            terminated: watch::channel(false).0,
        }
    }

    /// Answers every hello with `source_id`, followed by a second reply
    /// that callers must ignore.
    pub(crate) fn replying(source_id: &str) -> Self {
        Self::with_behaviour(HelloBehaviour::Reply(source_id.to_string()))
    }

    pub(crate) fn without_reply() -> Self {
        Self::with_behaviour(HelloBehaviour::EndWithoutReply)
    }

    /// Never answers the hello.
    pub(crate) fn silent() -> Self {
        Self::with_behaviour(HelloBehaviour::Silent)
    }

    pub(crate) fn failing_operations(mut self) -> Self {
        self.op_outcome = OpOutcome::Fail;
        self
    }

    /// Operations are recorded but never complete.
    pub(crate) fn stalled_operations(mut self) -> Self {
        self.op_outcome = OpOutcome::Stall;
        self
    }

    /// Simulates the peer dropping the channel.
    pub(crate) fn terminate(&self) {
        self.terminated.send_replace(true);
    }

    pub(crate) fn ops(&self) -> Vec<Op> {
        self.ops.lock().unwrap().clone()
    }

    pub(crate) fn hellos(&self) -> Vec<ReplicationHello> {
        self.hellos.lock().unwrap().clone()
    }

    pub(crate) fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn complete(&self) -> OperationFuture {
        match self.op_outcome {
            OpOutcome::Succeed => Box::pin(future::ready(Ok(()))),
            OpOutcome::Fail => Box::pin(future::ready(Err(ReplicationError::Disconnected))),
            OpOutcome::Stall => Box::pin(future::pending()),
        }
    }
}

impl ReplicationChannel for FakeChannel {
    fn hello(&self, hello: ReplicationHello) -> HelloReplyStream {
        self.hellos.lock().unwrap().push(hello);
        match &self.hello {
            HelloBehaviour::Reply(id) => stream::iter(vec![
                Ok(ReplicationHelloReply::new(id)),
                Ok(ReplicationHelloReply::new("second-reply")),
            ])
            .boxed(),
            HelloBehaviour::EndWithoutReply => stream::empty().boxed(),
            HelloBehaviour::Silent => stream::pending().boxed(),
        }
    }

    fn register(&self, instance: InstanceInfo) -> OperationFuture {
        self.ops.lock().unwrap().push(Op::Register(instance.id));
        self.complete()
    }

    fn unregister(&self, id: &str) -> OperationFuture {
        self.ops.lock().unwrap().push(Op::Unregister(id.to_string()));
        self.complete()
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn lifecycle(&self) -> OperationFuture {
        let mut terminated = self.terminated.subscribe();
        Box::pin(async move {
            let _ = terminated.wait_for(|done| *done).await;
            Err(ReplicationError::Disconnected)
        })
    }
}

// =============================================================================
// Fake Factory
// =============================================================================

type ChannelScript = Box<dyn Fn(usize) -> ReplicationResult<FakeChannel> + Send + Sync>;

/// Factory whose n-th channel request is answered by `script(n)`.
pub(crate) struct FakeFactory {
    script: ChannelScript,
    requests: Mutex<Vec<Instant>>,
    channels: Mutex<Vec<Arc<FakeChannel>>>,
    shutdowns: AtomicUsize,
}

impl FakeFactory {
    pub(crate) fn new<F>(script: F) -> Self
    where
        F: Fn(usize) -> ReplicationResult<FakeChannel> + Send + Sync + 'static,
    {
        FakeFactory {
            script: Box::new(script),
            requests: Mutex::new(Vec::new()),
            channels: Mutex::new(Vec::new()),
            shutdowns: AtomicUsize::new(0),
        }
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub(crate) fn request_times(&self) -> Vec<Instant> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn channels(&self) -> Vec<Arc<FakeChannel>> {
        self.channels.lock().unwrap().clone()
    }

    pub(crate) fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelFactory for FakeFactory {
    async fn new_channel(&self) -> ReplicationResult<Arc<dyn ReplicationChannel>> {
        let n = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(Instant::now());
            requests.len() - 1
        };
        let channel = Arc::new((self.script)(n)?);
        self.channels.lock().unwrap().push(channel.clone());
        Ok(channel as Arc<dyn ReplicationChannel>)
    }

    fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

// =============================================================================
// Scripted Change Source
// =============================================================================

enum Tail {
    End,
    Pending,
    Error(Mutex<Option<RegistryError>>),
}

/// Change source that replays a fixed list on every subscription.
pub(crate) struct ScriptedChangeSource {
    items: Vec<ChangeNotification<InstanceInfo>>,
    tail: Tail,
}

impl ScriptedChangeSource {
    pub(crate) fn new(items: Vec<ChangeNotification<InstanceInfo>>) -> Self {
        ScriptedChangeSource {
            items,
            tail: Tail::End,
        }
    }

    /// Keeps the stream open after the scripted items.
    pub(crate) fn then_pending(mut self) -> Self {
        self.tail = Tail::Pending;
        self
    }

    /// Fails the first subscription with `err` after the scripted items.
    pub(crate) fn then_error(mut self, err: RegistryError) -> Self {
        self.tail = Tail::Error(Mutex::new(Some(err)));
        self
    }
}

#[async_trait]
impl ChangeSource for ScriptedChangeSource {
    async fn size(&self) -> usize {
        self.items.len()
    }

    async fn stream_changes(
        &self,
        _interest: Interest,
        _matcher: SourceMatcher,
    ) -> RegistryResult<ChangeStream> {
        let items = stream::iter(self.items.clone().into_iter().map(Ok));
        let stream = match &self.tail {
            Tail::End => items.boxed(),
            Tail::Pending => items.chain(stream::pending()).boxed(),
            Tail::Error(err) => match err.lock().unwrap().take() {
                Some(err) => items.chain(stream::once(future::ready(Err(err)))).boxed(),
                None => items.boxed(),
            },
        };
        Ok(stream)
    }
}

// =============================================================================
// WebSocket Test Peer
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PeerBehaviour {
    /// Answers hellos with its own id.
    Reply,
    /// Answers hellos with an `Error` message.
    Reject,
    /// Never answers.
    Silent,
}

#[derive(Clone)]
struct PeerState {
    peer_id: String,
    behaviour: PeerBehaviour,
    received: mpsc::UnboundedSender<ReplicationMessage>,
    connections: Arc<AtomicUsize>,
}

/// A replication receiver on an ephemeral local port.
pub(crate) struct TestPeer {
    pub(crate) url: String,
    received: mpsc::UnboundedReceiver<ReplicationMessage>,
    connections: Arc<AtomicUsize>,
}

impl TestPeer {
    pub(crate) async fn spawn(peer_id: &str, behaviour: PeerBehaviour) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let connections = Arc::new(AtomicUsize::new(0));

        let state = PeerState {
            peer_id: peer_id.to_string(),
            behaviour,
            received: tx,
            connections: connections.clone(),
        };
        let app = Router::new()
            .route("/replication", get(upgrade))
            .with_state(state);
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        TestPeer {
            url: format!("ws://{}/replication", addr),
            received: rx,
            connections,
        }
    }

    /// Next message the peer received, skipping heartbeats.
    pub(crate) async fn next_message(&mut self) -> ReplicationMessage {
        loop {
            let message = tokio::time::timeout(Duration::from_secs(5), self.received.recv())
                .await
                .expect("peer received nothing in time")
                .expect("peer stopped");
            if !matches!(message, ReplicationMessage::Heartbeat { .. }) {
                return message;
            }
        }
    }

    pub(crate) fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

async fn upgrade(ws: WebSocketUpgrade, State(state): State<PeerState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_peer(socket, state))
}

async fn serve_peer(mut socket: WebSocket, state: PeerState) {
    state.connections.fetch_add(1, Ordering::SeqCst);

    while let Some(Ok(frame)) = socket.recv().await {
        let Message::Text(text) = frame else { continue };
        let Ok(message) = ReplicationMessage::from_json(text.as_str()) else { continue };
        let is_hello = matches!(message, ReplicationMessage::Hello(_));
        let _ = state.received.send(message);
        if !is_hello {
            continue;
        }

        let reply = match state.behaviour {
            PeerBehaviour::Reply => {
                ReplicationMessage::HelloReply(ReplicationHelloReply::new(&state.peer_id))
            }
            PeerBehaviour::Reject => ReplicationMessage::error("NOT_ACCEPTING", "replication disabled"),
            PeerBehaviour::Silent => continue,
        };
        let json = reply.to_json().unwrap();
        if socket.send(Message::Text(json.into())).await.is_err() {
            break;
        }
    }
}
