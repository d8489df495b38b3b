//! Error types for the domain layer.

use thiserror::Error;

/// Errors that occur during value object construction and state changes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Field '{field}' cannot be empty")]
    EmptyField { field: String },

    #[error("Field '{field}' must be between {min} and {max}, got {actual}")]
    OutOfRange {
        field: String,
        min: i32,
        max: i32,
        actual: i32,
    },

    #[error("Field '{field}' has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

impl ValidationError {
    /// Creates an empty field validation error.
    pub fn empty_field(field: impl Into<String>) -> Self {
        ValidationError::EmptyField {
            field: field.into(),
        }
    }

    /// Creates an out of range validation error.
    pub fn out_of_range(field: impl Into<String>, min: i32, max: i32, actual: i32) -> Self {
        ValidationError::OutOfRange {
            field: field.into(),
            min,
            max,
            actual,
        }
    }

    /// Creates an invalid format validation error.
    pub fn invalid_format(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFormat {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_build_expected_variants() {
        assert!(matches!(
            ValidationError::empty_field("name"),
            ValidationError::EmptyField { .. }
        ));
        assert!(matches!(
            ValidationError::out_of_range("severity", 1, 10, 12),
            ValidationError::OutOfRange { actual: 12, .. }
        ));
        assert!(matches!(
            ValidationError::invalid_format("stage", "unknown value"),
            ValidationError::InvalidFormat { .. }
        ));
    }

    #[test]
    fn displays_field_names() {
        let err = ValidationError::out_of_range("severity", 1, 10, 0);
        assert_eq!(
            err.to_string(),
            "Field 'severity' must be between 1 and 10, got 0"
        );
    }
}
