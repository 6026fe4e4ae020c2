//! # Replication Protocol Messages
//!
//! Message types exchanged between a sending write node and its peer.
//!
//! ## Protocol Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   Replication Protocol Messages                         │
//! │                                                                         │
//! │  HANDSHAKE                                                             │
//! │  ─────────                                                             │
//! │  SENDER ───► Hello { senderInstanceId, registrySize }                  │
//! │  PEER   ◄─── HelloReply { sourceId }                                   │
//! │              (sourceId == senderInstanceId means we dialled ourselves) │
//! │                                                                         │
//! │  STREAMING (SENDER → PEER)                                             │
//! │  ─────────────────────────                                             │
//! │  SENDER ───► Register { instance }      (Add / Modify)                 │
//! │  SENDER ───► Unregister { id }          (Delete)                       │
//! │                                                                         │
//! │  KEEPALIVE                                                             │
//! │  ─────────                                                             │
//! │  SENDER ───► Heartbeat { timestamp }                                   │
//! │                                                                         │
//! │  ERROR                                                                 │
//! │  ─────                                                                 │
//! │  PEER   ───► Error { code, message }   (peer ends the session)         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format
//! Adjacently tagged JSON:
//! ```json
//! { "type": "Register", "payload": { "instance": { "id": "...", ... } } }
//! ```

use beacon_core::InstanceInfo;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Current protocol version.
pub const PROTOCOL_VERSION: u32 = 1;

// =============================================================================
// Main Message Enum (Tagged Union)
// =============================================================================

/// All replication protocol messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ReplicationMessage {
    // =========================================================================
    // Handshake Messages
    // =========================================================================
    /// First message on every channel, sent by the replicating node.
    Hello(ReplicationHello),

    /// Peer's answer to `Hello`.
    HelloReply(ReplicationHelloReply),

    // =========================================================================
    // Streaming Messages
    // =========================================================================
    /// Upsert of one record on the peer.
    Register { instance: InstanceInfo },

    /// Removal of one record on the peer.
    Unregister { id: String },

    // =========================================================================
    // Keepalive / Error
    // =========================================================================
    Heartbeat { timestamp: String },

    Error { code: String, message: String },
}

// =============================================================================
// Handshake Payloads
// =============================================================================

/// Hello sent by the replicating node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationHello {
    /// Id of the sending node.
    pub sender_instance_id: String,

    /// Number of records in the sender's registry when the hello was built.
    pub registry_size: usize,

    #[serde(default = "default_protocol_version")]
    pub protocol_version: u32,
}

fn default_protocol_version() -> u32 {
    PROTOCOL_VERSION
}

impl ReplicationHello {
    pub fn new(sender_instance_id: &str, registry_size: usize) -> Self {
        ReplicationHello {
            sender_instance_id: sender_instance_id.to_string(),
            registry_size,
            protocol_version: PROTOCOL_VERSION,
        }
    }
}

/// Peer's handshake reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationHelloReply {
    /// Id of the node that answered.
    pub source_id: String,

    #[serde(default = "default_protocol_version")]
    pub protocol_version: u32,
}

impl ReplicationHelloReply {
    pub fn new(source_id: &str) -> Self {
        ReplicationHelloReply {
            source_id: source_id.to_string(),
            protocol_version: PROTOCOL_VERSION,
        }
    }
}

// =============================================================================
// Helper Implementations
// =============================================================================

impl ReplicationMessage {
    pub fn register(instance: InstanceInfo) -> Self {
        ReplicationMessage::Register { instance }
    }

    pub fn unregister(id: &str) -> Self {
        ReplicationMessage::Unregister { id: id.to_string() }
    }

    pub fn heartbeat() -> Self {
        ReplicationMessage::Heartbeat {
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn error(code: &str, message: &str) -> Self {
        ReplicationMessage::Error {
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    /// Returns the message type name, for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            ReplicationMessage::Hello(_) => "Hello",
            ReplicationMessage::HelloReply(_) => "HelloReply",
            ReplicationMessage::Register { .. } => "Register",
            ReplicationMessage::Unregister { .. } => "Unregister",
            ReplicationMessage::Heartbeat { .. } => "Heartbeat",
            ReplicationMessage::Error { .. } => "Error",
        }
    }

    /// Serializes to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_wire_format() {
        let hello = ReplicationMessage::Hello(ReplicationHello::new("node-a", 42));
        let json = hello.to_json().unwrap();
        assert!(json.contains("\"type\":\"Hello\""));
        assert!(json.contains("\"senderInstanceId\":\"node-a\""));
        assert!(json.contains("\"registrySize\":42"));
    }

    #[test]
    fn test_hello_reply_without_version_defaults() {
        let json = r#"{"type":"HelloReply","payload":{"sourceId":"node-b"}}"#;
        let parsed = ReplicationMessage::from_json(json).unwrap();
        assert_eq!(
            parsed,
            ReplicationMessage::HelloReply(ReplicationHelloReply::new("node-b"))
        );
    }

    #[test]
    fn test_register_carries_instance() {
        let instance = InstanceInfo::new("i-1", "billing").with_address("billing-1", "10.0.0.5", 8080);
        let json = ReplicationMessage::register(instance.clone()).to_json().unwrap();
        assert!(json.contains("\"type\":\"Register\""));

        match ReplicationMessage::from_json(&json).unwrap() {
            ReplicationMessage::Register { instance: parsed } => assert_eq!(parsed, instance),
            other => panic!("Expected Register, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let json = r#"{"type":"Snapshot","payload":{}}"#;
        assert!(ReplicationMessage::from_json(json).is_err());
    }

    #[test]
    fn test_type_names() {
        assert_eq!(ReplicationMessage::unregister("i-1").type_name(), "Unregister");
        assert_eq!(ReplicationMessage::heartbeat().type_name(), "Heartbeat");
        assert_eq!(ReplicationMessage::error("E1", "boom").type_name(), "Error");
    }
}
