//! Error types for causal-sync identifiers.

use thiserror::Error;

/// Construction-time validation failures for identifier value types.
///
/// Every variant carries the field name so [`DeviceId`](crate::DeviceId) and
/// [`OperationId`](crate::OperationId) share one error vocabulary. A failed
/// construction never yields a partially-valid value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The input string was empty.
    #[error("{field} must be a non-empty string")]
    Empty {
        /// Name of the field being validated.
        field: &'static str,
    },

    /// The input string contained only whitespace.
    #[error("{field} cannot be empty or whitespace")]
    Whitespace {
        /// Name of the field being validated.
        field: &'static str,
    },

    /// The input string exceeded the maximum length.
    #[error("{field} cannot exceed {max} characters")]
    TooLong {
        /// Name of the field being validated.
        field: &'static str,
        /// Maximum allowed length in characters.
        max: usize,
    },

    /// The input string contained characters outside the allowed alphabet.
    #[error("{field} can only contain {allowed}")]
    InvalidCharacters {
        /// Name of the field being validated.
        field: &'static str,
        /// Human-readable description of the allowed alphabet.
        allowed: &'static str,
    },
}
