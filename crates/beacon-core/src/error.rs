//! # Error Types
//!
//! Domain-specific error types for beacon-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  beacon-core errors (this file)                                        │
//! │  ├── CoreError          - General domain errors                        │
//! │  └── ValidationError    - Record validation failures                   │
//! │                                                                         │
//! │  beacon-registry errors                                                │
//! │  └── RegistryError      - Store / change stream failures               │
//! │                                                                         │
//! │  beacon-replication errors                                             │
//! │  └── ReplicationError   - Session, transport, config failures          │
//! │                                                                         │
//! │  Flow: ValidationError → RegistryError → ReplicationError → logs       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A record was changed by a source that does not own it.
    ///
    /// ## When This Occurs
    /// - A replicated update tries to overwrite a LOCAL record
    /// - A peer tries to remove a record another peer registered
    #[error("Instance {id} is owned by {owner}, not {attempted}")]
    SourceMismatch {
        id: String,
        owner: String,
        attempted: String,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Record validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format.
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Collection holds too many entries.
    #[error("{field} must have at most {max} entries")]
    TooMany { field: String, max: usize },
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::SourceMismatch {
            id: "i-1".to_string(),
            owner: "local".to_string(),
            attempted: "replicated:node-b".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Instance i-1 is owned by local, not replicated:node-b"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "id".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
        assert_eq!(core_err.to_string(), "Validation error: id is required");
    }
}
