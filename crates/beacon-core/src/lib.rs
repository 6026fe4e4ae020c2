//! # beacon-core: Pure Registry Types for Beacon
//!
//! This crate holds the data model every other Beacon crate speaks:
//! instance records, the source tag that says where a record came from,
//! interests, and change notifications. It has zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Beacon Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   apps/write-node (daemon)                      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │        beacon-replication (sender-side peer sessions)           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │        beacon-registry (in-memory sourced registry)             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ beacon-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │  source   │  │ interest  │  │ validation│  │   │
//! │  │   │ Instance  │  │  Origin   │  │ Interest  │  │   rules   │  │   │
//! │  │   │   Info    │  │  Source   │  │  Change   │  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - `InstanceInfo` and `InstanceStatus`
//! - [`source`] - `Origin`, `Source` and `SourceMatcher`
//! - [`interest`] - `Interest`, `ChangeKind`, `ChangeNotification`
//! - [`error`] - Domain error types
//! - [`validation`] - Record validation
//!
//! ## Example Usage
//!
//! ```rust
//! use beacon_core::{ChangeNotification, InstanceInfo, Interest, Origin, Source, SourceMatcher};
//!
//! let instance = InstanceInfo::new("i-001", "billing").with_address("billing-1", "10.0.0.5", 8080);
//! let change = ChangeNotification::add(instance);
//!
//! assert!(Interest::FullRegistry.matches(&change.data));
//! assert!(SourceMatcher::for_origin(Origin::Local).matches(&Source::local()));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod interest;
pub mod source;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use interest::{ChangeKind, ChangeNotification, Interest};
pub use source::{Origin, Source, SourceMatcher};
pub use types::{InstanceInfo, InstanceStatus};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum length of an instance identifier.
pub const MAX_INSTANCE_ID_LEN: usize = 256;

/// Maximum length of an application name.
pub const MAX_APP_NAME_LEN: usize = 128;

/// Maximum number of metadata entries carried by one instance record.
///
/// Records are pushed to every peer on every change, so metadata is kept
/// small.
pub const MAX_METADATA_ENTRIES: usize = 64;
