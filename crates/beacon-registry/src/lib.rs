//! # beacon-registry: In-Memory Sourced Registry
//!
//! The registry a write node serves from. Every entry remembers the
//! [`Source`](beacon_core::Source) that registered it, and every change is
//! published to subscribers as a [`ChangeNotification`](beacon_core::ChangeNotification).
//!
//! ## Module Organization
//!
//! - [`registry`] - `SourcedRegistry`, the store itself
//! - [`change_source`] - the `ChangeSource` capability replication consumes
//! - [`error`] - Registry error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use beacon_core::{InstanceInfo, Interest, Origin, Source, SourceMatcher};
//! use beacon_registry::{ChangeSource, SourcedRegistry};
//! use futures_util::StreamExt;
//!
//! # async fn example() -> Result<(), beacon_registry::RegistryError> {
//! let registry = SourcedRegistry::new();
//! let instance = InstanceInfo::new("i-1", "billing").with_address("billing-1", "10.0.0.5", 8080);
//! registry.register(instance, Source::local()).await?;
//!
//! let mut changes = registry
//!     .stream_changes(Interest::FullRegistry, SourceMatcher::for_origin(Origin::Local))
//!     .await?;
//! while let Some(change) = changes.next().await {
//!     println!("{:?}", change?.kind);
//! }
//! # Ok(())
//! # }
//! ```

pub mod change_source;
pub mod error;
pub mod registry;

pub use change_source::{ChangeSource, ChangeStream};
pub use error::{RegistryError, RegistryResult};
pub use registry::{SourcedRegistry, DEFAULT_CHANGE_BUFFER};
