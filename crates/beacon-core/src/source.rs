//! # Record Sources
//!
//! Every registry entry is tagged with the [`Source`] that put it there.
//! The origin part of that tag is what breaks replication cycles: a write
//! node only pushes records whose origin is [`Origin::Local`], so a record
//! learned from a peer is never sent back out.
//!
//! ```text
//!   node A (LOCAL: a1) ──replicate──► node B (REPLICATED: a1)
//!                                        │
//!                                        └── filtered out, never sent to C or A
//! ```

use serde::{Deserialize, Serialize};

/// Where a registry entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Registered directly on this node by the instance itself.
    Local,
    /// Learned from a peer write node through replication.
    Replicated,
    /// Loaded from a bootstrap snapshot at startup.
    Bootstrap,
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Origin::Local => write!(f, "local"),
            Origin::Replicated => write!(f, "replicated"),
            Origin::Bootstrap => write!(f, "bootstrap"),
        }
    }
}

/// Origin plus an optional name, e.g. the peer a replicated record came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Source {
    origin: Origin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl Source {
    pub fn new(origin: Origin, name: Option<String>) -> Self {
        Source { origin, name }
    }

    /// Source for records registered on this node.
    pub fn local() -> Self {
        Source::new(Origin::Local, None)
    }

    /// Source for records received from `peer`.
    pub fn replicated(peer: impl Into<String>) -> Self {
        Source::new(Origin::Replicated, Some(peer.into()))
    }

    /// Source for records loaded at startup.
    pub fn bootstrap() -> Self {
        Source::new(Origin::Bootstrap, None)
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}:{}", self.origin, name),
            None => write!(f, "{}", self.origin),
        }
    }
}

/// Predicate over [`Source`] used to filter change streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceMatcher {
    /// Accept every source.
    Any,
    /// Accept sources with this origin, whatever their name.
    Origin(Origin),
    /// Accept exactly this source.
    Exact(Source),
}

impl SourceMatcher {
    /// Matcher accepting every source with the given origin.
    pub fn for_origin(origin: Origin) -> Self {
        SourceMatcher::Origin(origin)
    }

    pub fn matches(&self, source: &Source) -> bool {
        match self {
            SourceMatcher::Any => true,
            SourceMatcher::Origin(origin) => source.origin == *origin,
            SourceMatcher::Exact(expected) => source == expected,
        }
    }
}
