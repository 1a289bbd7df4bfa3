//! Fault oracle port
//!
//! Defines the interface to the external service that decides, per call,
//! whether a synthetic fault is injected.

use async_trait::async_trait;
use domain::{CallSignature, ExecutionIndex, FaultDecision, SessionId};
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::error::ApplicationError;

/// Query sent to the oracle for one intercepted call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleQuery {
    /// Where in the call graph the call happens
    pub execution_index: ExecutionIndex,
    /// What is being called
    pub call_signature: CallSignature,
    /// Test execution the call belongs to
    pub session_id: SessionId,
    /// Local service issuing the call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_service: Option<String>,
}

/// Observed result of a call, as seen by the adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallResult {
    /// The call completed successfully
    Success,
    /// The call failed with a framework-specific code (gRPC code name or HTTP status)
    Failure { code: String },
}

impl CallResult {
    /// Create a failure result
    pub fn failure(code: impl Into<String>) -> Self {
        Self::Failure { code: code.into() }
    }

    /// True for successful calls
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Report of a completed call, sent back to the oracle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeReport {
    pub session_id: SessionId,
    pub execution_index: ExecutionIndex,
    pub call_signature: CallSignature,
    /// Decision that was applied to the call
    pub decision: FaultDecision,
    /// What the caller observed
    pub result: CallResult,
}

/// Port for the external fault-injection oracle
#[cfg_attr(test, automock)]
#[async_trait]
pub trait FaultOraclePort: Send + Sync {
    /// Decide whether to inject a fault for the queried call
    async fn decide(&self, query: &OracleQuery) -> Result<FaultDecision, ApplicationError>;

    /// Report how a call completed
    async fn report_outcome(&self, report: &OutcomeReport) -> Result<(), ApplicationError>;
}
