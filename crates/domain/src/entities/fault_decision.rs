//! Fault decisions returned by the oracle

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What to do with one intercepted call
///
/// Decided once per (execution index, call signature) within a session and
/// reused for the remainder of that session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FaultDecision {
    /// Let the real call proceed untouched
    PassThrough,

    /// Fail the call locally with an error of the given kind
    InjectError {
        /// Error kind, e.g. `"UNAVAILABLE"` or `"503"`
        kind: String,
        /// Optional human-readable cause
        detail: Option<String>,
    },

    /// Delay the call, then let it proceed
    InjectLatency {
        #[serde(with = "duration_millis")]
        duration: Duration,
    },

    /// Answer the call locally with a corrupted payload
    InjectCorruptedResponse { payload: Vec<u8> },
}

impl FaultDecision {
    /// Create an error decision without detail
    pub fn error(kind: impl Into<String>) -> Self {
        Self::InjectError {
            kind: kind.into(),
            detail: None,
        }
    }

    /// Create a latency decision
    pub const fn latency(duration: Duration) -> Self {
        Self::InjectLatency { duration }
    }

    /// Create a corrupted response decision
    pub fn corrupt(payload: impl Into<Vec<u8>>) -> Self {
        Self::InjectCorruptedResponse {
            payload: payload.into(),
        }
    }

    /// True for every decision except `PassThrough`
    pub const fn is_fault(&self) -> bool {
        !matches!(self, Self::PassThrough)
    }

    /// Short label used on the oracle wire and in metrics
    pub const fn label(&self) -> &'static str {
        match self {
            Self::PassThrough => "pass",
            Self::InjectError { .. } => "error",
            Self::InjectLatency { .. } => "latency",
            Self::InjectCorruptedResponse { .. } => "corrupt",
        }
    }

    /// The fault to manufacture locally, if this decision short-circuits the call
    pub fn short_circuit(&self) -> Option<InjectedFault> {
        match self {
            Self::InjectError { kind, detail } => Some(InjectedFault::Error {
                kind: kind.clone(),
                detail: detail.clone(),
            }),
            Self::InjectCorruptedResponse { payload } => Some(InjectedFault::CorruptedResponse {
                payload: payload.clone(),
            }),
            Self::PassThrough | Self::InjectLatency { .. } => None,
        }
    }

    /// Delay to apply before the real call proceeds
    pub const fn delay(&self) -> Option<Duration> {
        match self {
            Self::InjectLatency { duration } => Some(*duration),
            _ => None,
        }
    }
}

/// An outcome manufactured locally instead of sending the real call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InjectedFault {
    /// A failure shaped like a real failure of `kind`
    Error { kind: String, detail: Option<String> },
    /// A successful-looking response carrying `payload`
    CorruptedResponse { payload: Vec<u8> },
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::cast_possible_truncation)]
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_through_is_not_a_fault() {
        let decision = FaultDecision::PassThrough;
        assert!(!decision.is_fault());
        assert_eq!(decision.label(), "pass");
        assert!(decision.short_circuit().is_none());
        assert!(decision.delay().is_none());
    }

    #[test]
    fn error_short_circuits() {
        let decision = FaultDecision::error("UNAVAILABLE");
        assert!(decision.is_fault());
        assert_eq!(
            decision.short_circuit(),
            Some(InjectedFault::Error {
                kind: "UNAVAILABLE".to_string(),
                detail: None
            })
        );
    }

    #[test]
    fn latency_delays_without_short_circuit() {
        let decision = FaultDecision::latency(Duration::from_millis(250));
        assert!(decision.is_fault());
        assert_eq!(decision.label(), "latency");
        assert!(decision.short_circuit().is_none());
        assert_eq!(decision.delay(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn corrupt_short_circuits_with_payload() {
        let decision = FaultDecision::corrupt(b"garbage".to_vec());
        assert!(matches!(
            decision.short_circuit(),
            Some(InjectedFault::CorruptedResponse { ref payload }) if payload == b"garbage"
        ));
    }

    #[test]
    fn latency_serializes_as_millis() {
        let decision = FaultDecision::latency(Duration::from_millis(1500));
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json, serde_json::json!({"type": "inject_latency", "duration": 1500}));

        let parsed: FaultDecision = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, decision);
    }
}
