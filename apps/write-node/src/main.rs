//! # Beacon Write Node
//!
//! Registry daemon that replicates its own records to peer write nodes.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Write Node                                      │
//! │                                                                         │
//! │  replication.toml ──► ReplicationConfig ──► ReplicationHandler × peers │
//! │                                                     │                   │
//! │  SourcedRegistry ◄── self registration (LOCAL)      ▼                   │
//! │        │                                      peer write nodes          │
//! │        └── LOCAL changes ─────────────────────────►                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `write-node [path/to/replication.toml]`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use beacon_core::Source;
use beacon_registry::SourcedRegistry;
use beacon_replication::{ReplicationConfig, ReplicationHandler};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("Starting Beacon write node...");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config =
        ReplicationConfig::load(config_path).context("Failed to load replication config")?;
    info!(
        node_id = %config.node_id(),
        peers = config.peers.len(),
        retry = %config.replication.retry.strategy,
        "Configuration loaded"
    );

    let registry = Arc::new(SourcedRegistry::new());
    registry
        .register(config.node.self_instance(), Source::local())
        .await
        .context("Failed to register own instance")?;

    if config.peers.is_empty() {
        warn!("No peers configured, nothing will be replicated");
    }

    let handlers: Vec<ReplicationHandler> = config
        .peers
        .iter()
        .map(|peer| ReplicationHandler::new(&config, peer, registry.clone()))
        .collect();
    for handler in &handlers {
        handler.start_replication();
    }

    shutdown_signal().await;

    for handler in &handlers {
        handler.shutdown();
    }
    info!("Write node shutdown complete");
    Ok(())
}

/// Waits for Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping replication...");
}
