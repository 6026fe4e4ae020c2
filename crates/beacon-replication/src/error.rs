//! # Replication Error Types
//!
//! Error types for replication sessions.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Replication Error Categories                         │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Protocol            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Connection     │  │  HandshakeFailed        │ │
//! │  │  MissingNodeId  │  │  Disconnected   │  │  InvalidChannelState    │ │
//! │  │  InvalidUrl     │  │  Timeout        │  │  PeerError              │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────────────────────────────────┐  │
//! │  │   Streaming     │  │   Lifecycle                                 │  │
//! │  │                 │  │                                             │  │
//! │  │  ChangeSource   │  │  ShuttingDown, RetriesExhausted             │  │
//! │  └─────────────────┘  └─────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything except configuration errors stays inside the retry loop:
//! a failed session discards its channel and a new one is requested.

use beacon_registry::RegistryError;
use thiserror::Error;

/// Result type alias for replication operations.
pub type ReplicationResult<T> = Result<T, ReplicationError>;

/// Replication error type covering every failure a sender session can hit.
#[derive(Debug, Error)]
pub enum ReplicationError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid replication configuration.
    #[error("Invalid replication configuration: {0}")]
    InvalidConfig(String),

    /// Missing node ID (required to detect self-loops).
    #[error("Node ID not configured")]
    MissingNodeId,

    /// Invalid peer URL.
    #[error("Invalid peer URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Failed to establish the peer connection.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Peer connection closed.
    #[error("Disconnected from replication peer")]
    Disconnected,

    /// An operation did not finish in time.
    #[error("{operation} timed out after {millis}ms")]
    Timeout { operation: String, millis: u64 },

    /// WebSocket protocol error.
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// The channel's background task ended with an error.
    #[error("Replication channel terminated: {0}")]
    ChannelTerminated(String),

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// The handshake did not produce a reply.
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    /// Operation issued in a channel state that does not allow it.
    #[error("Cannot {operation} while channel is {state}")]
    InvalidChannelState { operation: String, state: String },

    /// Failed to serialize or parse a message.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Peer reported an error and closed the session.
    #[error("Peer error {code}: {message}")]
    PeerError { code: String, message: String },

    // =========================================================================
    // Streaming Errors
    // =========================================================================
    /// The registry change stream failed.
    #[error("Change source error: {0}")]
    ChangeSource(#[from] RegistryError),

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    /// Handler or factory is shutting down.
    #[error("Replication is shutting down")]
    ShuttingDown,

    /// Retry policy gave up.
    #[error("Gave up after {attempts} failed attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<serde_json::Error> for ReplicationError {
    fn from(err: serde_json::Error) -> Self {
        ReplicationError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for ReplicationError {
    fn from(err: url::ParseError) -> Self {
        ReplicationError::InvalidUrl(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ReplicationError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed => ReplicationError::Disconnected,
            WsError::AlreadyClosed => ReplicationError::Disconnected,
            WsError::Protocol(p) => ReplicationError::WebSocketError(p.to_string()),
            WsError::Io(io) => ReplicationError::ConnectionFailed(io.to_string()),
            other => ReplicationError::WebSocketError(other.to_string()),
        }
    }
}

impl From<std::io::Error> for ReplicationError {
    fn from(err: std::io::Error) -> Self {
        ReplicationError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for ReplicationError {
    fn from(err: toml::de::Error) -> Self {
        ReplicationError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for ReplicationError {
    fn from(err: toml::ser::Error) -> Self {
        ReplicationError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl ReplicationError {
    /// Returns true if a fresh channel may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ReplicationError::ConnectionFailed(_)
            | ReplicationError::Disconnected
            | ReplicationError::Timeout { .. }
            | ReplicationError::WebSocketError(_)
            | ReplicationError::ChannelTerminated(_)
            | ReplicationError::HandshakeFailed(_)
            | ReplicationError::PeerError { .. } => true,
            ReplicationError::ChangeSource(err) => err.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(ReplicationError::ConnectionFailed("refused".into()).is_retryable());
        assert!(ReplicationError::Disconnected.is_retryable());
        assert!(ReplicationError::HandshakeFailed("no reply".into()).is_retryable());
        assert!(ReplicationError::ChangeSource(RegistryError::Lagged(3)).is_retryable());

        assert!(!ReplicationError::MissingNodeId.is_retryable());
        assert!(!ReplicationError::ShuttingDown.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = ReplicationError::Timeout {
            operation: "hello".into(),
            millis: 250,
        };
        assert_eq!(err.to_string(), "hello timed out after 250ms");

        let err = ReplicationError::RetriesExhausted {
            attempts: 3,
            last_error: "Disconnected from replication peer".into(),
        };
        assert!(err.to_string().contains("3 failed attempts"));
    }
}
