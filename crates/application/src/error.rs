//! Application-level errors

use std::time::Duration;

use domain::DomainError;
use thiserror::Error;

/// Errors that can occur in the application layer
///
/// None of these ever reach the instrumented application: every variant
/// except [`ApplicationError::Configuration`] degrades to pass-through.
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// Domain-level error
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// No ambient execution context for an outbound call
    #[error("No execution context available for call site {0}")]
    MissingContext(String),

    /// Oracle could not be reached or answered with a non-success status
    #[error("Fault oracle unreachable: {0}")]
    OracleUnreachable(String),

    /// Oracle did not answer within the configured bound
    #[error("Fault oracle timed out after {0:?}")]
    OracleTimeout(Duration),

    /// Oracle answered with something that is not a valid decision
    #[error("Fault oracle protocol error: {0}")]
    OracleProtocol(String),

    /// Propagated metadata was present but could not be decoded
    #[error("Malformed propagated metadata: {0}")]
    MalformedPropagatedMetadata(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApplicationError {
    /// Check if this error degrades to pass-through instead of failing
    pub const fn is_degradable(&self) -> bool {
        !matches!(self, Self::Configuration(_))
    }

    /// Short reason label for metrics and logs
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Domain(_) => "domain",
            Self::MissingContext(_) => "missing_context",
            Self::OracleUnreachable(_) => "oracle_unreachable",
            Self::OracleTimeout(_) => "oracle_timeout",
            Self::OracleProtocol(_) => "oracle_protocol",
            Self::MalformedPropagatedMetadata(_) => "malformed_metadata",
            Self::Configuration(_) => "configuration",
            Self::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_configuration_is_fatal() {
        assert!(!ApplicationError::Configuration("bad endpoint".into()).is_degradable());
        assert!(ApplicationError::OracleTimeout(Duration::from_secs(1)).is_degradable());
        assert!(ApplicationError::MissingContext("svcA.rpc1".into()).is_degradable());
        assert!(ApplicationError::MalformedPropagatedMetadata("x".into()).is_degradable());
    }

    #[test]
    fn domain_errors_convert() {
        let err: ApplicationError = DomainError::malformed("bad").into();
        assert!(matches!(err, ApplicationError::Domain(_)));
        assert_eq!(err.reason(), "domain");
        assert_eq!(err.to_string(), "Malformed metadata: bad");
    }

    #[test]
    fn timeout_message() {
        let err = ApplicationError::OracleTimeout(Duration::from_millis(500));
        assert_eq!(err.to_string(), "Fault oracle timed out after 500ms");
    }
}
