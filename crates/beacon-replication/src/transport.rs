//! # WebSocket Transport
//!
//! WebSocket implementation of [`ChannelFactory`] and [`ReplicationChannel`].
//!
//! ## Channel Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    WebSocket Channel States                             │
//! │                                                                         │
//! │  ┌────────┐   hello()   ┌───────────┐  HelloReply  ┌───────────┐        │
//! │  │  Idle  │ ──────────► │ Handshake │ ───────────► │ Connected │        │
//! │  └───┬────┘             └─────┬─────┘              └─────┬─────┘        │
//! │      │                        │                          │              │
//! │      │        close() / peer Error / close frame / I/O error            │
//! │      │                        │                          │              │
//! │      ▼                        ▼                          ▼              │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                             Closed                              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  register / unregister are only accepted while Connected.              │
//! │  One background task per channel owns the socket: it writes frames in  │
//! │  the order operations were issued and sends a heartbeat on an interval.│
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The factory owns a parent [`CancellationToken`]; every channel runs under a
//! child token, so factory shutdown closes every channel it created.

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{future, stream, SinkExt, StreamExt};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{timeout, Instant, MissedTickBehavior};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use beacon_core::InstanceInfo;

use crate::channel::{ChannelFactory, HelloReplyStream, OperationFuture, ReplicationChannel};
use crate::config::{PeerConfig, ReplicationSettings};
use crate::error::{ReplicationError, ReplicationResult};
use crate::protocol::{ReplicationHello, ReplicationHelloReply, ReplicationMessage};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Type alias for the WebSocket write half.
type WsSink = SplitSink<WsStream, WsMessage>;

// =============================================================================
// Channel State
// =============================================================================

/// Lifecycle state of one WebSocket channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelState {
    /// Connected, hello not sent yet.
    Idle = 0,
    /// Hello sent, waiting for the reply.
    Handshake = 1,
    /// Reply received; operations allowed.
    Connected = 2,
    Closed = 3,
}

impl ChannelState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ChannelState::Idle,
            1 => ChannelState::Handshake,
            2 => ChannelState::Connected,
            _ => ChannelState::Closed,
        }
    }
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelState::Idle => write!(f, "idle"),
            ChannelState::Handshake => write!(f, "handshake"),
            ChannelState::Connected => write!(f, "connected"),
            ChannelState::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug)]
struct AtomicChannelState(AtomicU8);

impl AtomicChannelState {
    fn new(state: ChannelState) -> Self {
        AtomicChannelState(AtomicU8::new(state as u8))
    }

    fn load(&self) -> ChannelState {
        ChannelState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn store(&self, state: ChannelState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Moves `from` → `to`; false if the state was not `from`.
    fn transition(&self, from: ChannelState, to: ChannelState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

// =============================================================================
// Transport Configuration
// =============================================================================

/// Configuration for channels to one peer.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// WebSocket URL to connect to.
    pub url: String,

    /// Connection timeout.
    pub connect_timeout: Duration,

    /// Interval between heartbeats on an open channel.
    pub heartbeat_interval: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            url: String::new(),
            connect_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

impl TransportConfig {
    pub fn for_peer(peer: &PeerConfig, settings: &ReplicationSettings) -> Self {
        TransportConfig {
            url: peer.url.clone(),
            connect_timeout: settings.connect_timeout(),
            heartbeat_interval: settings.heartbeat_interval(),
        }
    }
}

// =============================================================================
// Channel Factory
// =============================================================================

/// Opens WebSocket channels to one peer.
pub struct WebSocketChannelFactory {
    config: TransportConfig,
    shutdown: CancellationToken,
}

impl WebSocketChannelFactory {
    pub fn new(config: TransportConfig) -> Self {
        WebSocketChannelFactory {
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Connects and returns the concrete channel.
    pub async fn connect(&self) -> ReplicationResult<WebSocketChannel> {
        if self.shutdown.is_cancelled() {
            return Err(ReplicationError::ShuttingDown);
        }

        let ws = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(ReplicationError::ShuttingDown),
            result = self.connect_with_timeout() => result?,
        };

        info!(url = %self.config.url, "Replication channel connected");
        Ok(WebSocketChannel::spawn(
            ws,
            &self.config,
            self.shutdown.child_token(),
        ))
    }

    /// Connects with timeout.
    async fn connect_with_timeout(&self) -> ReplicationResult<WsStream> {
        let connect_future = connect_async(self.config.url.as_str());

        match timeout(self.config.connect_timeout, connect_future).await {
            Ok(Ok((ws_stream, response))) => {
                debug!(status = ?response.status(), "WebSocket handshake complete");
                Ok(ws_stream)
            }
            Ok(Err(e)) => Err(ReplicationError::from(e)),
            Err(_) => Err(ReplicationError::Timeout {
                operation: "connect".to_string(),
                millis: self.config.connect_timeout.as_millis() as u64,
            }),
        }
    }
}

#[async_trait]
impl ChannelFactory for WebSocketChannelFactory {
    async fn new_channel(&self) -> ReplicationResult<Arc<dyn ReplicationChannel>> {
        let channel = self.connect().await?;
        Ok(Arc::new(channel))
    }

    fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!(url = %self.config.url, "Shutting down replication channel factory");
        }
        self.shutdown.cancel();
    }
}

// =============================================================================
// Channel
// =============================================================================

enum Command {
    Hello {
        message: ReplicationMessage,
        replies: mpsc::UnboundedSender<ReplicationResult<ReplicationHelloReply>>,
    },
    Send {
        message: ReplicationMessage,
        done: oneshot::Sender<ReplicationResult<()>>,
    },
}

/// How the channel task ended: `Ok` when closed locally, otherwise the reason.
type Outcome = Option<Result<(), String>>;

/// One WebSocket session with a peer.
pub struct WebSocketChannel {
    url: String,
    state: Arc<AtomicChannelState>,
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
    outcome: watch::Receiver<Outcome>,
}

impl WebSocketChannel {
    fn spawn(ws: WsStream, config: &TransportConfig, cancel: CancellationToken) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = watch::channel(None);
        let state = Arc::new(AtomicChannelState::new(ChannelState::Idle));

        let task = ChannelTask {
            url: config.url.clone(),
            state: state.clone(),
            commands: commands_rx,
            cancel: cancel.clone(),
            heartbeat_interval: config.heartbeat_interval,
            outcome: outcome_tx,
        };
        tokio::spawn(task.run(ws));

        WebSocketChannel {
            url: config.url.clone(),
            state,
            commands: commands_tx,
            cancel,
            outcome: outcome_rx,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state.load()
    }

    /// Queues `message`; the future resolves once the frame is written.
    fn dispatch(&self, operation: &str, message: ReplicationMessage) -> OperationFuture {
        let state = self.state.load();
        if state != ChannelState::Connected {
            return Box::pin(future::ready(Err(ReplicationError::InvalidChannelState {
                operation: operation.to_string(),
                state: state.to_string(),
            })));
        }

        let (done_tx, done_rx) = oneshot::channel();
        if self
            .commands
            .send(Command::Send {
                message,
                done: done_tx,
            })
            .is_err()
        {
            return Box::pin(future::ready(Err(ReplicationError::Disconnected)));
        }

        Box::pin(async move { done_rx.await.unwrap_or(Err(ReplicationError::Disconnected)) })
    }
}

impl ReplicationChannel for WebSocketChannel {
    fn hello(&self, hello: ReplicationHello) -> HelloReplyStream {
        if !self.state.transition(ChannelState::Idle, ChannelState::Handshake) {
            let err = ReplicationError::InvalidChannelState {
                operation: "hello".to_string(),
                state: self.state.load().to_string(),
            };
            return stream::once(future::ready(Err(err))).boxed();
        }

        let (replies_tx, replies_rx) = mpsc::unbounded_channel();
        let command = Command::Hello {
            message: ReplicationMessage::Hello(hello),
            replies: replies_tx,
        };
        if self.commands.send(command).is_err() {
            return stream::once(future::ready(Err(ReplicationError::Disconnected))).boxed();
        }

        UnboundedReceiverStream::new(replies_rx).boxed()
    }

    fn register(&self, instance: InstanceInfo) -> OperationFuture {
        self.dispatch("register", ReplicationMessage::register(instance))
    }

    fn unregister(&self, id: &str) -> OperationFuture {
        self.dispatch("unregister", ReplicationMessage::unregister(id))
    }

    fn close(&self) {
        if self.state.load() != ChannelState::Closed {
            debug!(url = %self.url, "Closing replication channel");
        }
        self.state.store(ChannelState::Closed);
        self.cancel.cancel();
    }

    fn lifecycle(&self) -> OperationFuture {
        let mut outcome = self.outcome.clone();
        Box::pin(async move {
            let ended = outcome.wait_for(Option::is_some).await.map(|v| (*v).clone());
            match ended {
                Ok(Some(Ok(()))) => Ok(()),
                Ok(Some(Err(reason))) => Err(ReplicationError::ChannelTerminated(reason)),
                Ok(None) | Err(_) => Err(ReplicationError::Disconnected),
            }
        })
    }
}

impl Drop for WebSocketChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// =============================================================================
// Channel Task
// =============================================================================

/// Background task owning the socket of one channel.
struct ChannelTask {
    url: String,
    state: Arc<AtomicChannelState>,
    commands: mpsc::UnboundedReceiver<Command>,
    cancel: CancellationToken,
    heartbeat_interval: Duration,
    outcome: watch::Sender<Outcome>,
}

impl ChannelTask {
    async fn run(self, ws: WsStream) {
        let ChannelTask {
            url,
            state,
            mut commands,
            cancel,
            heartbeat_interval,
            outcome,
        } = self;

        let (mut write, mut read) = ws.split();
        let mut hello_replies: Option<mpsc::UnboundedSender<ReplicationResult<ReplicationHelloReply>>> =
            None;

        let mut heartbeat =
            tokio::time::interval_at(Instant::now() + heartbeat_interval, heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result: ReplicationResult<()> = loop {
            tokio::select! {
                biased;

                // Local close or factory shutdown
                _ = cancel.cancelled() => {
                    let _ = write.send(WsMessage::Close(None)).await;
                    break Ok(());
                }

                // Outgoing frames, in the order they were issued
                command = commands.recv() => {
                    let Some(command) = command else {
                        break Ok(());
                    };
                    match command {
                        Command::Hello { message, replies } => {
                            hello_replies = Some(replies);
                            if let Err(e) = send_message(&mut write, &message).await {
                                break Err(e);
                            }
                        }
                        Command::Send { message, done } => {
                            match send_message(&mut write, &message).await {
                                Ok(()) => {
                                    let _ = done.send(Ok(()));
                                }
                                Err(e) => {
                                    let _ = done.send(Err(ReplicationError::ChannelTerminated(e.to_string())));
                                    break Err(e);
                                }
                            }
                        }
                    }
                }

                // Incoming frames
                incoming = read.next() => {
                    match incoming {
                        Some(Ok(WsMessage::Text(text))) => match ReplicationMessage::from_json(&text) {
                            Ok(ReplicationMessage::HelloReply(reply)) => {
                                if state.transition(ChannelState::Handshake, ChannelState::Connected) {
                                    debug!(url = %url, peer_id = %reply.source_id, "Hello reply received");
                                }
                                if let Some(replies) = &hello_replies {
                                    let _ = replies.send(Ok(reply));
                                }
                            }
                            Ok(ReplicationMessage::Error { code, message }) => {
                                warn!(url = %url, code = %code, message = %message, "Peer rejected replication");
                                break Err(ReplicationError::PeerError { code, message });
                            }
                            Ok(other) => {
                                debug!(msg_type = other.type_name(), "Ignoring unexpected message from peer");
                            }
                            Err(e) => {
                                warn!(error = %e, "Failed to parse message from peer");
                            }
                        },
                        Some(Ok(WsMessage::Ping(data))) => {
                            if let Err(e) = write.send(WsMessage::Pong(data)).await {
                                break Err(e.into());
                            }
                        }
                        Some(Ok(WsMessage::Close(frame))) => {
                            info!(url = %url, ?frame, "Peer closed replication channel");
                            break Err(ReplicationError::Disconnected);
                        }
                        Some(Ok(_)) => {
                            // Binary, pong and raw frames carry nothing for us
                        }
                        Some(Err(e)) => break Err(e.into()),
                        None => break Err(ReplicationError::Disconnected),
                    }
                }

                _ = heartbeat.tick() => {
                    if let Err(e) = send_message(&mut write, &ReplicationMessage::heartbeat()).await {
                        break Err(e);
                    }
                }
            }
        };

        state.store(ChannelState::Closed);
        commands.close();

        match &result {
            Ok(()) => debug!(url = %url, "Replication channel closed"),
            Err(e) => warn!(url = %url, error = %e, "Replication channel terminated"),
        }
        outcome.send_replace(Some(result.map_err(|e| e.to_string())));
    }
}

async fn send_message(write: &mut WsSink, message: &ReplicationMessage) -> ReplicationResult<()> {
    let json = message.to_json()?;
    debug!(msg_type = message.type_name(), "Sending message");
    write.send(WsMessage::Text(json.into())).await?;
    Ok(())
}
