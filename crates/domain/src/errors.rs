//! Domain-level errors

use thiserror::Error;

/// Errors that can occur in the domain layer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// Session identifier is empty, too long or not header-safe
    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),

    /// Call site identifier is empty or too long
    #[error("Invalid call site id: {0}")]
    InvalidCallSite(String),

    /// Appending a segment would exceed the maximum index depth
    #[error("Execution index too deep: depth {depth} exceeds maximum {max}")]
    IndexTooDeep { depth: usize, max: usize },

    /// The occurrence counter for a call site has no values left
    #[error("Occurrence counter exhausted for call site {0}")]
    OccurrenceOverflow(String),

    /// Propagated metadata could not be decoded
    #[error("Malformed metadata: {0}")]
    MalformedMetadata(String),
}

impl DomainError {
    /// Create a malformed metadata error
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedMetadata(reason.into())
    }
}
