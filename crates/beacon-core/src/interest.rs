//! # Interests and Change Notifications
//!
//! An [`Interest`] selects which records a subscriber wants to hear about.
//! The registry answers a subscription with a stream of
//! [`ChangeNotification`]s: first the current matching contents as `Add`s,
//! then every later `Add`, `Modify` and `Delete`.

use serde::{Deserialize, Serialize};

use crate::types::InstanceInfo;

// =============================================================================
// Interest
// =============================================================================

/// Subscription filter over registry contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Interest {
    /// Every record currently or subsequently present.
    FullRegistry,
    /// Records of one application.
    Application(String),
    /// One record, by instance id.
    Instance(String),
}

impl Interest {
    pub fn for_full_registry() -> Self {
        Interest::FullRegistry
    }

    pub fn for_application(app: &str) -> Self {
        Interest::Application(app.to_string())
    }

    pub fn for_instance(id: &str) -> Self {
        Interest::Instance(id.to_string())
    }

    pub fn matches(&self, instance: &InstanceInfo) -> bool {
        match self {
            Interest::FullRegistry => true,
            Interest::Application(app) => instance.app.eq_ignore_ascii_case(app),
            Interest::Instance(id) => instance.id == *id,
        }
    }
}

// =============================================================================
// Change Notification
// =============================================================================

/// What happened to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Add,
    Modify,
    Delete,
    /// A kind this build does not know about.
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::Add => write!(f, "add"),
            ChangeKind::Modify => write!(f, "modify"),
            ChangeKind::Delete => write!(f, "delete"),
            ChangeKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// A single change to a record.
///
/// For `Add` and `Modify`, `data` is the full new record. For `Delete` it is
/// the last known record; consumers only rely on its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeNotification<T> {
    pub kind: ChangeKind,
    pub data: T,
}

impl<T> ChangeNotification<T> {
    pub fn new(kind: ChangeKind, data: T) -> Self {
        ChangeNotification { kind, data }
    }

    pub fn add(data: T) -> Self {
        Self::new(ChangeKind::Add, data)
    }

    pub fn modify(data: T) -> Self {
        Self::new(ChangeKind::Modify, data)
    }

    pub fn delete(data: T) -> Self {
        Self::new(ChangeKind::Delete, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interest_matching() {
        let instance = InstanceInfo::new("i-1", "Billing");

        assert!(Interest::for_full_registry().matches(&instance));
        assert!(Interest::for_application("billing").matches(&instance));
        assert!(!Interest::for_application("search").matches(&instance));
        assert!(Interest::for_instance("i-1").matches(&instance));
        assert!(!Interest::for_instance("i-2").matches(&instance));
    }

    #[test]
    fn test_unknown_kind_deserializes() {
        let kind: ChangeKind = serde_json::from_str("\"buffer_sentinel\"").unwrap();
        assert_eq!(kind, ChangeKind::Unknown);

        let kind: ChangeKind = serde_json::from_str("\"modify\"").unwrap();
        assert_eq!(kind, ChangeKind::Modify);
    }

    #[test]
    fn test_notification_constructors() {
        assert_eq!(ChangeNotification::add(1).kind, ChangeKind::Add);
        assert_eq!(ChangeNotification::modify(1).kind, ChangeKind::Modify);
        assert_eq!(ChangeNotification::delete(1).kind, ChangeKind::Delete);
    }
}
