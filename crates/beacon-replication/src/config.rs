//! # Replication Configuration
//!
//! Configuration for a write node and the peers it replicates to.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     BEACON_NODE_ID=write-1                                             │
//! │     BEACON_PEERS=ws://write-2:7400/replication,ws://write-3:...        │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/beacon-registry/replication.toml (Linux)                 │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     generated node id, fixed 500ms retry, no peers                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [node]
//! id = "write-1"
//! name = "Write Node 1"
//! app = "beacon-write"
//! hostname = "write-1.internal"
//! ip_address = "10.0.0.11"
//! port = 7400
//!
//! [replication]
//! connect_timeout_secs = 10
//! heartbeat_interval_secs = 30
//! handshake_timeout_ms = 5000
//!
//! [replication.retry]
//! strategy = "fixed"   # fixed | exponential
//! wait_ms = 500
//! max_wait_ms = 30000
//! max_retries = 0      # 0 = retry forever
//!
//! [[peers]]
//! name = "write-2"
//! url = "ws://write-2.internal:7400/replication"
//! ```

use beacon_core::InstanceInfo;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::error::{ReplicationError, ReplicationResult};

/// Wait between replication attempts when nothing else is configured.
pub const DEFAULT_RETRY_WAIT_MS: u64 = 500;

// =============================================================================
// Node Configuration
// =============================================================================

/// Identity of this write node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Unique node identifier, sent in every Hello.
    /// Auto-generated on first run if not provided.
    pub id: String,

    /// Human-readable node name.
    #[serde(default = "default_node_name")]
    pub name: String,

    /// Application name the node registers itself under.
    #[serde(default = "default_app")]
    pub app: String,

    #[serde(default = "default_hostname")]
    pub hostname: String,

    #[serde(default = "default_ip_address")]
    pub ip_address: String,

    /// Port the node serves replication on.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_node_name() -> String {
    "Beacon Write Node".to_string()
}

fn default_app() -> String {
    "beacon-write".to_string()
}

fn default_hostname() -> String {
    "localhost".to_string()
}

fn default_ip_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7400
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            id: Uuid::new_v4().to_string(),
            name: default_node_name(),
            app: default_app(),
            hostname: default_hostname(),
            ip_address: default_ip_address(),
            port: default_port(),
        }
    }
}

impl NodeConfig {
    /// The record this node registers for itself.
    pub fn self_instance(&self) -> InstanceInfo {
        InstanceInfo::new(&self.id, &self.app)
            .with_address(&self.hostname, &self.ip_address, self.port)
            .with_metadata("node.name", &self.name)
    }
}

// =============================================================================
// Retry Settings
// =============================================================================

/// How the wait between replication attempts evolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    /// Same wait before every attempt.
    #[default]
    Fixed,

    /// Doubling wait after consecutive failures, capped at `max_wait_ms`.
    Exponential,
}

impl std::fmt::Display for RetryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryStrategy::Fixed => write!(f, "fixed"),
            RetryStrategy::Exponential => write!(f, "exponential"),
        }
    }
}

impl std::str::FromStr for RetryStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fixed" => Ok(RetryStrategy::Fixed),
            "exponential" | "backoff" => Ok(RetryStrategy::Exponential),
            _ => Err(format!("Unknown retry strategy: {}", s)),
        }
    }
}

/// Retry settings for the replication lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default)]
    pub strategy: RetryStrategy,

    /// Wait before a new channel is requested (milliseconds).
    /// For the exponential strategy this is the first wait.
    #[serde(default = "default_retry_wait")]
    pub wait_ms: u64,

    /// Upper bound for the exponential strategy (milliseconds).
    #[serde(default = "default_max_wait")]
    pub max_wait_ms: u64,

    /// Consecutive failed attempts before giving up.
    /// Set to 0 for infinite retries.
    #[serde(default)]
    pub max_retries: u32,
}

fn default_retry_wait() -> u64 {
    DEFAULT_RETRY_WAIT_MS
}

fn default_max_wait() -> u64 {
    30_000
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            strategy: RetryStrategy::default(),
            wait_ms: default_retry_wait(),
            max_wait_ms: default_max_wait(),
            max_retries: 0,
        }
    }
}

impl RetrySettings {
    pub fn wait(&self) -> Duration {
        Duration::from_millis(self.wait_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

// =============================================================================
// Replication Settings
// =============================================================================

/// Session and transport settings shared by every peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationSettings {
    /// Connection timeout (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Interval between keepalive heartbeats (seconds).
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Maximum wait for the peer's hello reply (milliseconds).
    /// Unset means wait as long as the channel stays open.
    #[serde(default)]
    pub handshake_timeout_ms: Option<u64>,

    #[serde(default)]
    pub retry: RetrySettings,
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_heartbeat_interval() -> u64 {
    30
}

impl Default for ReplicationSettings {
    fn default() -> Self {
        ReplicationSettings {
            connect_timeout_secs: default_connect_timeout(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            handshake_timeout_ms: None,
            retry: RetrySettings::default(),
        }
    }
}

impl ReplicationSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn handshake_timeout(&self) -> Option<Duration> {
        self.handshake_timeout_ms.map(Duration::from_millis)
    }
}

// =============================================================================
// Peers
// =============================================================================

/// One replication target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    /// WebSocket URL of the peer's replication endpoint.
    pub url: String,

    /// Label used in logs. Defaults to the URL's host.
    #[serde(default)]
    pub name: Option<String>,
}

impl PeerConfig {
    pub fn new(url: &str) -> Self {
        PeerConfig {
            url: url.to_string(),
            name: None,
        }
    }

    /// Returns the label to log this peer under.
    pub fn label(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| self.url.clone())
    }
}

// =============================================================================
// Main Replication Configuration
// =============================================================================

/// Complete write-node replication configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplicationConfig {
    #[serde(default)]
    pub node: NodeConfig,

    #[serde(default)]
    pub replication: ReplicationSettings,

    #[serde(default)]
    pub peers: Vec<PeerConfig>,
}

impl ReplicationConfig {
    /// Creates a new config with defaults and a generated node ID.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (replication.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ReplicationResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading replication config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> ReplicationResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ReplicationError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ReplicationError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)
            .map_err(|e| ReplicationError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Replication config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ReplicationResult<()> {
        if self.node.id.trim().is_empty() {
            return Err(ReplicationError::MissingNodeId);
        }

        let retry = &self.replication.retry;
        if retry.wait_ms == 0 {
            return Err(ReplicationError::InvalidConfig(
                "retry.wait_ms must be greater than 0".into(),
            ));
        }
        if retry.strategy == RetryStrategy::Exponential && retry.max_wait_ms < retry.wait_ms {
            return Err(ReplicationError::InvalidConfig(format!(
                "retry.max_wait_ms ({}) must not be below retry.wait_ms ({})",
                retry.max_wait_ms, retry.wait_ms
            )));
        }
        if self.replication.heartbeat_interval_secs == 0 {
            return Err(ReplicationError::InvalidConfig(
                "heartbeat_interval_secs must be greater than 0".into(),
            ));
        }
        if self.replication.connect_timeout_secs == 0 {
            return Err(ReplicationError::InvalidConfig(
                "connect_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.replication.handshake_timeout_ms == Some(0) {
            return Err(ReplicationError::InvalidConfig(
                "handshake_timeout_ms must be greater than 0 when set".into(),
            ));
        }

        let mut seen = HashSet::new();
        for peer in &self.peers {
            validate_peer_url(&peer.url)?;
            if !seen.insert(peer.url.as_str()) {
                return Err(ReplicationError::InvalidConfig(format!(
                    "Peer listed twice: {}",
                    peer.url
                )));
            }
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from `lookup`, keyed by environment variable name.
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(id) = lookup("BEACON_NODE_ID") {
            debug!(node_id = %id, "Overriding node ID from environment");
            self.node.id = id;
        }

        if let Some(name) = lookup("BEACON_NODE_NAME") {
            self.node.name = name;
        }

        if let Some(port) = lookup("BEACON_NODE_PORT") {
            match port.parse::<u16>() {
                Ok(p) => self.node.port = p,
                Err(_) => warn!(port = %port, "Ignoring invalid node port in environment"),
            }
        }

        if let Some(peers) = lookup("BEACON_PEERS") {
            debug!(peers = %peers, "Overriding peers from environment");
            self.peers = peers
                .split(',')
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(PeerConfig::new)
                .collect();
        }

        if let Some(wait) = lookup("BEACON_RETRY_WAIT_MS") {
            match wait.parse::<u64>() {
                Ok(ms) => self.replication.retry.wait_ms = ms,
                Err(_) => warn!(wait = %wait, "Ignoring invalid retry wait in environment"),
            }
        }

        if let Some(strategy) = lookup("BEACON_RETRY_STRATEGY") {
            match strategy.parse() {
                Ok(parsed) => self.replication.retry.strategy = parsed,
                Err(e) => warn!(error = %e, "Ignoring retry strategy from environment"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("io", "beacon", "beacon-registry")
            .map(|dirs| dirs.config_dir().join("replication.toml"))
    }

    /// Returns the node ID.
    pub fn node_id(&self) -> &str {
        &self.node.id
    }
}

fn validate_peer_url(raw: &str) -> ReplicationResult<()> {
    let url = Url::parse(raw)?;
    match url.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(ReplicationError::InvalidUrl(format!(
            "Peer URL must use ws:// or wss://, got {}:// in {}",
            other, raw
        ))),
    }
}
