//! # Registry Record Types
//!
//! The instance record held by the registry and replicated between write
//! nodes.
//!
//! ## Record Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         InstanceInfo                                    │
//! │                                                                         │
//! │  id            "i-0ab12"         unique across the whole registry       │
//! │  app           "billing"         logical application name               │
//! │  vip_address   "billing.vip"     optional virtual address               │
//! │  hostname      "billing-1"                                              │
//! │  ip_address    "10.0.0.5"                                               │
//! │  port          8080                                                     │
//! │  secure_port   Some(8443)                                               │
//! │  status        UP                                                       │
//! │  metadata      { "zone": "us-east-1a" }                                 │
//! │  last_updated  2026-01-01T00:00:00Z                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Instance Status
// =============================================================================

/// Lifecycle status an instance reports about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    /// Instance is booting and not yet ready for traffic.
    Starting,
    /// Instance is ready for traffic.
    Up,
    /// Instance is unhealthy.
    Down,
    /// Instance was taken out of rotation by an operator.
    OutOfService,
    /// Status not reported.
    #[default]
    Unknown,
}

impl InstanceStatus {
    /// Returns true if the instance should receive traffic.
    pub fn is_routable(&self) -> bool {
        matches!(self, InstanceStatus::Up)
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceStatus::Starting => write!(f, "STARTING"),
            InstanceStatus::Up => write!(f, "UP"),
            InstanceStatus::Down => write!(f, "DOWN"),
            InstanceStatus::OutOfService => write!(f, "OUT_OF_SERVICE"),
            InstanceStatus::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// =============================================================================
// Instance Info
// =============================================================================

/// A single service instance registered in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceInfo {
    /// Unique instance identifier.
    pub id: String,

    /// Application this instance belongs to.
    pub app: String,

    /// Virtual address clients resolve the application by.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vip_address: Option<String>,

    /// Host name the instance runs on.
    #[serde(default)]
    pub hostname: String,

    /// IP address the instance listens on.
    #[serde(default)]
    pub ip_address: String,

    /// Plain-text port.
    #[serde(default)]
    pub port: u16,

    /// TLS port, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure_port: Option<u16>,

    /// Reported status.
    #[serde(default)]
    pub status: InstanceStatus,

    /// Free-form metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,

    /// When this record was last changed.
    pub last_updated: DateTime<Utc>,
}

impl InstanceInfo {
    /// Creates a record with only the identity fields set.
    pub fn new(id: impl Into<String>, app: impl Into<String>) -> Self {
        InstanceInfo {
            id: id.into(),
            app: app.into(),
            vip_address: None,
            hostname: String::new(),
            ip_address: String::new(),
            port: 0,
            secure_port: None,
            status: InstanceStatus::default(),
            metadata: BTreeMap::new(),
            last_updated: Utc::now(),
        }
    }

    /// Sets the network location.
    pub fn with_address(mut self, hostname: &str, ip_address: &str, port: u16) -> Self {
        self.hostname = hostname.to_string();
        self.ip_address = ip_address.to_string();
        self.port = port;
        self
    }

    /// Sets the TLS port.
    pub fn with_secure_port(mut self, port: u16) -> Self {
        self.secure_port = Some(port);
        self
    }

    /// Sets the virtual address.
    pub fn with_vip(mut self, vip: &str) -> Self {
        self.vip_address = Some(vip.to_string());
        self
    }

    /// Sets the status.
    pub fn with_status(mut self, status: InstanceStatus) -> Self {
        self.status = status;
        self
    }

    /// Adds one metadata entry.
    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    /// Bumps `last_updated` to now.
    pub fn touch(&mut self) {
        self.last_updated = Utc::now();
    }

    /// Returns `host:port` for logging.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}
