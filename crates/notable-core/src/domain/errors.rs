//! Domain error types
//!
//! Errors raised while constructing or decoding domain values: malformed
//! identifiers, unknown enum names coming off the wire, invalid timestamps.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    /// A pen name that does not map to a known pen
    #[error("Unknown pen: {0}")]
    UnknownPen(String),

    /// A queue operation name that does not map to a known operation
    #[error("Unknown sync operation: {0}")]
    UnknownOperation(String),

    /// A target or deletion type name that is not recognised
    #[error("Unknown item type: {0}")]
    UnknownItemType(String),

    /// Timestamp string could not be parsed
    #[error("Invalid timestamp '{value}': {reason}")]
    InvalidTimestamp {
        /// The offending input
        value: String,
        /// Parser message
        reason: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
