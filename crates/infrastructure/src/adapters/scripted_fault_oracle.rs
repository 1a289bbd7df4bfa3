//! Offline fault oracle driven by a fixed rule list
//!
//! Lets a harness inject faults without a Filibuster server. Rules are
//! checked in order; the first rule that matches the call and still has
//! injections left decides. Calls matching no rule pass through.

use application::{ApplicationError, FaultOraclePort, OracleQuery, OutcomeReport};
use async_trait::async_trait;
use domain::{ExecutionIndex, FaultDecision};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One injection rule
///
/// Every filter that is set must match. A rule with no filters matches
/// every call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultRule {
    /// Decision to return when the rule matches
    pub decision: FaultDecision,

    /// Only calls to this service
    #[serde(default)]
    pub service: Option<String>,

    /// Only calls to this method
    #[serde(default)]
    pub method: Option<String>,

    /// Only calls issued from this call site (leaf of the index)
    #[serde(default)]
    pub call_site: Option<String>,

    /// Only the call with exactly this execution index
    #[serde(default)]
    pub execution_index: Option<ExecutionIndex>,

    /// Only the n-th occurrence of the call site under its parent
    #[serde(default)]
    pub occurrence: Option<u32>,

    /// Maximum number of injections (None = unlimited)
    #[serde(default)]
    pub max_injections: Option<usize>,
}

impl FaultRule {
    /// A rule that applies `decision` to every call
    pub const fn new(decision: FaultDecision) -> Self {
        Self {
            decision,
            service: None,
            method: None,
            call_site: None,
            execution_index: None,
            occurrence: None,
            max_injections: None,
        }
    }

    #[must_use]
    pub fn for_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    #[must_use]
    pub fn for_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    #[must_use]
    pub fn at_call_site(mut self, call_site: impl Into<String>) -> Self {
        self.call_site = Some(call_site.into());
        self
    }

    #[must_use]
    pub fn at_index(mut self, index: ExecutionIndex) -> Self {
        self.execution_index = Some(index);
        self
    }

    #[must_use]
    pub const fn at_occurrence(mut self, occurrence: u32) -> Self {
        self.occurrence = Some(occurrence);
        self
    }

    #[must_use]
    pub const fn limit(mut self, max_injections: usize) -> Self {
        self.max_injections = Some(max_injections);
        self
    }

    fn matches(&self, query: &OracleQuery) -> bool {
        let signature = &query.call_signature;
        let leaf = query.execution_index.leaf();

        self.service
            .as_ref()
            .is_none_or(|s| *s == signature.service_name)
            && self
                .method
                .as_ref()
                .is_none_or(|m| *m == signature.method_name)
            && self
                .call_site
                .as_ref()
                .is_none_or(|c| leaf.is_some_and(|l| l.call_site_id.as_str() == c))
            && self
                .execution_index
                .as_ref()
                .is_none_or(|i| *i == query.execution_index)
            && self
                .occurrence
                .is_none_or(|n| leaf.is_some_and(|l| l.occurrence_count == n))
    }
}

/// Fault oracle answering from [`FaultRule`]s
#[derive(Debug, Default)]
pub struct ScriptedFaultOracle {
    rules: Vec<FaultRule>,
    injected: Mutex<Vec<usize>>,
    reports: Mutex<Vec<OutcomeReport>>,
}

impl ScriptedFaultOracle {
    /// Create an oracle over `rules`, checked in order
    #[must_use]
    pub fn new(rules: Vec<FaultRule>) -> Self {
        let injected = Mutex::new(vec![0; rules.len()]);
        Self {
            rules,
            injected,
            reports: Mutex::new(Vec::new()),
        }
    }

    /// Parse a JSON array of rules
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the JSON is not a list of rules.
    pub fn from_json(json: &str) -> Result<Self, ApplicationError> {
        let rules: Vec<FaultRule> = serde_json::from_str(json)
            .map_err(|e| ApplicationError::Configuration(format!("fault rules: {e}")))?;
        Ok(Self::new(rules))
    }

    /// Injections made so far, per rule
    pub fn injections(&self) -> Vec<usize> {
        self.injected.lock().clone()
    }

    /// Outcome reports received so far
    pub fn reports(&self) -> Vec<OutcomeReport> {
        self.reports.lock().clone()
    }
}

#[async_trait]
impl FaultOraclePort for ScriptedFaultOracle {
    async fn decide(&self, query: &OracleQuery) -> Result<FaultDecision, ApplicationError> {
        let mut injected = self.injected.lock();
        for (i, rule) in self.rules.iter().enumerate() {
            let exhausted = rule.max_injections.is_some_and(|max| injected[i] >= max);
            if exhausted || !rule.matches(query) {
                continue;
            }
            injected[i] += 1;
            debug!(
                rule = i,
                execution_index = %query.execution_index,
                decision = rule.decision.label(),
                "Scripted rule matched"
            );
            return Ok(rule.decision.clone());
        }
        Ok(FaultDecision::PassThrough)
    }

    async fn report_outcome(&self, report: &OutcomeReport) -> Result<(), ApplicationError> {
        self.reports.lock().push(report.clone());
        Ok(())
    }
}
