//! # Validation Module
//!
//! Record validation applied by the registry before a record is stored.
//! Anything stored may be pushed to every peer, so a malformed record is
//! rejected at the door rather than replicated.
//!
//! ## Usage
//! ```rust
//! use beacon_core::validation::{validate_instance, validate_instance_id};
//! use beacon_core::InstanceInfo;
//!
//! validate_instance_id("i-0ab12").unwrap();
//!
//! let instance = InstanceInfo::new("i-0ab12", "billing").with_address("billing-1", "10.0.0.5", 8080);
//! validate_instance(&instance).unwrap();
//! ```

use crate::error::ValidationError;
use crate::types::InstanceInfo;
use crate::{MAX_APP_NAME_LEN, MAX_INSTANCE_ID_LEN, MAX_METADATA_ENTRIES};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validates an instance identifier.
///
/// ## Rules
/// - Must not be empty or whitespace
/// - At most [`MAX_INSTANCE_ID_LEN`] characters
/// - No whitespace or control characters inside
pub fn validate_instance_id(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "id".to_string(),
        });
    }

    if id.len() > MAX_INSTANCE_ID_LEN {
        return Err(ValidationError::TooLong {
            field: "id".to_string(),
            max: MAX_INSTANCE_ID_LEN,
        });
    }

    if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ValidationError::InvalidFormat {
            field: "id".to_string(),
            reason: "must not contain whitespace or control characters".to_string(),
        });
    }

    Ok(())
}

/// Validates an application name.
pub fn validate_app_name(app: &str) -> ValidationResult<()> {
    let app = app.trim();

    if app.is_empty() {
        return Err(ValidationError::Required {
            field: "app".to_string(),
        });
    }

    if app.len() > MAX_APP_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: "app".to_string(),
            max: MAX_APP_NAME_LEN,
        });
    }

    Ok(())
}

/// Validates a listening port. Zero means "not listening" and is only
/// accepted for the secure port, which is optional anyway.
pub fn validate_port(field: &str, port: u16) -> ValidationResult<()> {
    if port == 0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 1,
            max: u16::MAX as i64,
        });
    }
    Ok(())
}

/// Validates a whole record.
pub fn validate_instance(instance: &InstanceInfo) -> ValidationResult<()> {
    validate_instance_id(&instance.id)?;
    validate_app_name(&instance.app)?;
    validate_port("port", instance.port)?;

    if let Some(secure_port) = instance.secure_port {
        validate_port("secure_port", secure_port)?;
    }

    if instance.metadata.len() > MAX_METADATA_ENTRIES {
        return Err(ValidationError::TooMany {
            field: "metadata".to_string(),
            max: MAX_METADATA_ENTRIES,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_instance_id() {
        assert!(validate_instance_id("i-0ab12").is_ok());
        assert!(validate_instance_id("").is_err());
        assert!(validate_instance_id("   ").is_err());
        assert!(validate_instance_id("has space").is_err());
        assert!(validate_instance_id(&"a".repeat(MAX_INSTANCE_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_validate_app_name() {
        assert!(validate_app_name("billing").is_ok());
        assert!(validate_app_name("").is_err());
        assert!(validate_app_name(&"b".repeat(MAX_APP_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn test_validate_instance() {
        let ok = InstanceInfo::new("i-1", "billing").with_address("h", "10.0.0.1", 8080);
        assert!(validate_instance(&ok).is_ok());

        let no_port = InstanceInfo::new("i-1", "billing");
        assert!(matches!(
            validate_instance(&no_port),
            Err(ValidationError::OutOfRange { .. })
        ));

        let mut crowded = ok.clone();
        for i in 0..=MAX_METADATA_ENTRIES {
            crowded.metadata.insert(format!("k{}", i), "v".to_string());
        }
        assert!(matches!(
            validate_instance(&crowded),
            Err(ValidationError::TooMany { .. })
        ));
    }
}
