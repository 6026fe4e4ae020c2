//! # Sourced Registry
//!
//! In-memory instance store with per-entry ownership.
//!
//! ## Ownership Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Who may change an entry                           │
//! │                                                                         │
//! │  Existing owner     Writer          register        unregister          │
//! │  ──────────────     ──────          ────────        ──────────          │
//! │  (none)             any             Add             Ok(false)           │
//! │  LOCAL              LOCAL           Modify          Delete              │
//! │  LOCAL              REPLICATED      SourceMismatch  SourceMismatch      │
//! │  REPLICATED:b       LOCAL           Modify (owner   SourceMismatch      │
//! │                                     becomes LOCAL)                      │
//! │  REPLICATED:b       REPLICATED:c    Modify (owner   Delete              │
//! │                                     becomes c)                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Removal requires the same origin as the owner. A LOCAL record therefore
//! can never be overwritten or removed by replication traffic.
//!
//! ## Snapshot + Live Cut
//!
//! Writers publish their notification while still holding the write lock,
//! and subscribers join the broadcast while holding the read lock. Every
//! change is therefore either in a subscriber's snapshot or in its live
//! stream, never both and never neither.

use std::collections::HashMap;

use async_trait::async_trait;
use beacon_core::validation::validate_instance;
use beacon_core::{
    ChangeKind, ChangeNotification, CoreError, InstanceInfo, Interest, Origin, Source,
    SourceMatcher,
};
use futures_util::{future, stream, StreamExt};
use tokio::sync::{broadcast, RwLock};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info};

use crate::change_source::{ChangeSource, ChangeStream};
use crate::error::{RegistryError, RegistryResult};

/// Default number of buffered notifications per subscriber before it lags.
pub const DEFAULT_CHANGE_BUFFER: usize = 1024;

#[derive(Debug, Clone)]
struct Entry {
    instance: InstanceInfo,
    source: Source,
}

#[derive(Debug, Clone)]
struct SourcedChange {
    notification: ChangeNotification<InstanceInfo>,
    source: Source,
}

/// In-memory registry keyed by instance id.
pub struct SourcedRegistry {
    entries: RwLock<HashMap<String, Entry>>,
    changes_tx: broadcast::Sender<SourcedChange>,
}

impl Default for SourcedRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SourcedRegistry {
    pub fn new() -> Self {
        Self::with_change_buffer(DEFAULT_CHANGE_BUFFER)
    }

    /// Creates a registry whose subscribers may fall `capacity` notifications
    /// behind before receiving [`RegistryError::Lagged`].
    pub fn with_change_buffer(capacity: usize) -> Self {
        let (changes_tx, _) = broadcast::channel(capacity.max(1));
        SourcedRegistry {
            entries: RwLock::new(HashMap::new()),
            changes_tx,
        }
    }

    /// Adds or replaces a record on behalf of `source`.
    ///
    /// Returns `Add` for a new id and `Modify` for an existing one.
    pub async fn register(
        &self,
        instance: InstanceInfo,
        source: Source,
    ) -> RegistryResult<ChangeKind> {
        validate_instance(&instance)?;

        let mut entries = self.entries.write().await;

        let kind = match entries.get(&instance.id) {
            None => ChangeKind::Add,
            Some(existing) => {
                if existing.source.origin() == Origin::Local && source.origin() != Origin::Local
                {
                    return Err(CoreError::SourceMismatch {
                        id: instance.id.clone(),
                        owner: existing.source.to_string(),
                        attempted: source.to_string(),
                    }
                    .into());
                }
                ChangeKind::Modify
            }
        };

        debug!(id = %instance.id, app = %instance.app, %source, %kind, "Registry update");

        entries.insert(
            instance.id.clone(),
            Entry {
                instance: instance.clone(),
                source: source.clone(),
            },
        );

        // No subscribers is fine; the send error only means nobody listens.
        let _ = self.changes_tx.send(SourcedChange {
            notification: ChangeNotification::new(kind, instance),
            source,
        });

        Ok(kind)
    }

    /// Removes a record on behalf of `source`.
    ///
    /// Returns `Ok(false)` if the id is not registered.
    pub async fn unregister(&self, id: &str, source: &Source) -> RegistryResult<bool> {
        let mut entries = self.entries.write().await;

        let Some(existing) = entries.get(id) else {
            return Ok(false);
        };

        if existing.source.origin() != source.origin() {
            return Err(CoreError::SourceMismatch {
                id: id.to_string(),
                owner: existing.source.to_string(),
                attempted: source.to_string(),
            }
            .into());
        }

        let Some(removed) = entries.remove(id) else {
            return Ok(false);
        };

        info!(id = %id, source = %removed.source, "Instance unregistered");

        let _ = self.changes_tx.send(SourcedChange {
            notification: ChangeNotification::delete(removed.instance),
            source: removed.source,
        });

        Ok(true)
    }

    /// Returns a copy of a record, if present.
    pub async fn get(&self, id: &str) -> Option<InstanceInfo> {
        self.entries
            .read()
            .await
            .get(id)
            .map(|entry| entry.instance.clone())
    }

    /// Returns the source that owns a record, if present.
    pub async fn source_of(&self, id: &str) -> Option<Source> {
        self.entries
            .read()
            .await
            .get(id)
            .map(|entry| entry.source.clone())
    }

    /// Number of records across all sources.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ChangeSource for SourcedRegistry {
    async fn size(&self) -> usize {
        self.len().await
    }

    async fn stream_changes(
        &self,
        interest: Interest,
        matcher: SourceMatcher,
    ) -> RegistryResult<ChangeStream> {
        let entries = self.entries.read().await;

        let live = BroadcastStream::new(self.changes_tx.subscribe());

        let mut snapshot: Vec<&Entry> = entries
            .values()
            .filter(|entry| matcher.matches(&entry.source) && interest.matches(&entry.instance))
            .collect();
        snapshot.sort_by(|a, b| a.instance.id.cmp(&b.instance.id));

        let snapshot: Vec<RegistryResult<ChangeNotification<InstanceInfo>>> = snapshot
            .into_iter()
            .map(|entry| Ok(ChangeNotification::add(entry.instance.clone())))
            .collect();

        drop(entries);

        debug!(
            ?interest,
            ?matcher,
            snapshot = snapshot.len(),
            "Change stream subscribed"
        );

        let live = live.filter_map(move |item| {
            let next = match item {
                Ok(change) => {
                    if matcher.matches(&change.source)
                        && interest.matches(&change.notification.data)
                    {
                        Some(Ok(change.notification))
                    } else {
                        None
                    }
                }
                Err(BroadcastStreamRecvError::Lagged(missed)) => {
                    Some(Err(RegistryError::Lagged(missed)))
                }
            };
            future::ready(next)
        });

        Ok(stream::iter(snapshot).chain(live).boxed())
    }
}
