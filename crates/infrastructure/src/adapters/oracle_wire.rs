//! JSON bodies exchanged with the fault oracle

use std::time::Duration;

use application::{ApplicationError, CallResult, OutcomeReport};
use domain::{CallSignature, ExecutionIndex, FaultDecision, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Answer to a decide request
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DecideResponse {
    decision: String,
    #[serde(default)]
    detail: Option<Value>,
}

impl DecideResponse {
    /// Interpret the response as a decision
    pub(crate) fn into_decision(self) -> Result<FaultDecision, ApplicationError> {
        match self.decision.to_ascii_lowercase().as_str() {
            "pass" | "pass_through" | "passthrough" => Ok(FaultDecision::PassThrough),
            "error" => parse_error(self.detail),
            "latency" => parse_latency(self.detail).map(FaultDecision::latency),
            "corrupt" => parse_corrupt(self.detail).map(FaultDecision::corrupt),
            other => Err(protocol(format!("unknown decision '{other}'"))),
        }
    }
}

fn protocol(reason: impl Into<String>) -> ApplicationError {
    ApplicationError::OracleProtocol(reason.into())
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_error(detail: Option<Value>) -> Result<FaultDecision, ApplicationError> {
    match detail {
        Some(Value::Object(map)) => {
            let kind = map
                .get("code")
                .or_else(|| map.get("kind"))
                .and_then(scalar_to_string)
                .ok_or_else(|| protocol("error detail without code"))?;
            let detail = map
                .get("cause")
                .or_else(|| map.get("message"))
                .and_then(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                });
            Ok(FaultDecision::InjectError { kind, detail })
        },
        Some(ref scalar) => scalar_to_string(scalar)
            .map(FaultDecision::error)
            .ok_or_else(|| protocol("error detail is not a code")),
        None => Err(protocol("error decision without detail")),
    }
}

fn parse_latency(detail: Option<Value>) -> Result<Duration, ApplicationError> {
    let millis = match detail {
        Some(Value::Object(map)) => map.get("ms").or_else(|| map.get("sleep")).cloned(),
        other => other,
    }
    .ok_or_else(|| protocol("latency decision without duration"))?;

    if let Some(ms) = millis.as_u64() {
        return Ok(Duration::from_millis(ms));
    }
    millis
        .as_f64()
        .and_then(|ms| Duration::try_from_secs_f64(ms / 1000.0).ok())
        .ok_or_else(|| protocol(format!("invalid latency {millis}")))
}

fn parse_corrupt(detail: Option<Value>) -> Result<Vec<u8>, ApplicationError> {
    match detail {
        Some(Value::String(s)) => Ok(s.into_bytes()),
        Some(Value::Null) | None => Err(protocol("corrupt decision without payload")),
        Some(other) => serde_json::to_vec(&other).map_err(|e| protocol(e.to_string())),
    }
}

/// How a call ended, as reported to the oracle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum WireOutcome {
    Success,
    Failure { code: String },
    Faulted { decision: &'static str },
}

/// Body of an outcome report
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdateRequest<'a> {
    session_id: &'a SessionId,
    execution_index: &'a ExecutionIndex,
    call_signature: &'a CallSignature,
    outcome: WireOutcome,
}

impl<'a> UpdateRequest<'a> {
    pub(crate) fn from_report(report: &'a OutcomeReport) -> Self {
        let outcome = if report.decision.short_circuit().is_some() {
            WireOutcome::Faulted {
                decision: report.decision.label(),
            }
        } else {
            match &report.result {
                CallResult::Success => WireOutcome::Success,
                CallResult::Failure { code } => WireOutcome::Failure { code: code.clone() },
            }
        };
        Self {
            session_id: &report.session_id,
            execution_index: &report.execution_index,
            call_signature: &report.call_signature,
            outcome,
        }
    }
}
