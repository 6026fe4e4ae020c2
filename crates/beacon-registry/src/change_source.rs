//! # Change Source
//!
//! The capability replication needs from a registry: its current size and
//! a live, filterable stream of changes. [`SourcedRegistry`](crate::SourcedRegistry)
//! is the production implementation; tests substitute their own.

use async_trait::async_trait;
use beacon_core::{ChangeNotification, InstanceInfo, Interest, SourceMatcher};
use futures_util::stream::BoxStream;

use crate::error::RegistryResult;

/// Live stream of registry changes. An `Err` item means the stream can no
/// longer be trusted and the subscriber should start over.
pub type ChangeStream = BoxStream<'static, RegistryResult<ChangeNotification<InstanceInfo>>>;

#[async_trait]
pub trait ChangeSource: Send + Sync {
    /// Number of records currently held, across all sources.
    async fn size(&self) -> usize;

    /// Subscribes to records matching `interest` whose source matches
    /// `matcher`.
    ///
    /// The stream first yields every matching record as an `Add`, then every
    /// subsequent matching change, in the order the registry applied them.
    async fn stream_changes(
        &self,
        interest: Interest,
        matcher: SourceMatcher,
    ) -> RegistryResult<ChangeStream>;
}
