//! Shared error building blocks.

use thiserror::Error;

/// Errors raised while constructing or validating shared primitive types.
#[derive(Debug, Error)]
pub enum PrimitiveError {
    /// A required field was empty or whitespace-only.
    #[error("{field} must not be empty")]
    EmptyField {
        /// Name of the offending field.
        field: &'static str,
    },
    /// A numeric field failed a range check.
    #[error("{field} must be {constraint}, got {value}")]
    OutOfRange {
        /// Name of the offending field.
        field: &'static str,
        /// Human-readable description of the required range.
        constraint: &'static str,
        /// The rejected value.
        value: i64,
    },
}

/// Result alias used throughout the shared primitive types.
pub type PrimitiveResult<T> = Result<T, PrimitiveError>;
