//! # Registry Error Types

use beacon_core::{CoreError, ValidationError};
use thiserror::Error;

/// Result type alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Registry operation errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A change stream subscriber fell behind the broadcast buffer.
    ///
    /// ## When This Occurs
    /// - A replication session stalls on a slow peer while local
    ///   registrations keep arriving
    ///
    /// The subscriber has missed notifications and must re-subscribe to get
    /// a fresh snapshot.
    #[error("Change stream lagged: {0} notifications dropped")]
    Lagged(u64),

    /// Domain rule violation (ownership, validation).
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<ValidationError> for RegistryError {
    fn from(err: ValidationError) -> Self {
        RegistryError::Core(CoreError::Validation(err))
    }
}

impl RegistryError {
    /// Returns true if re-subscribing can recover from this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RegistryError::Lagged(_))
    }
}
