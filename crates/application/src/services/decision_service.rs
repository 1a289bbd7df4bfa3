//! Fault decision service
//!
//! Resolves the decision for one call: cached decision first, then the
//! oracle, then pass-through. Oracle trouble of any kind never surfaces to
//! the instrumented application.

use std::{fmt, sync::Arc, time::Duration};

use domain::{CallSignature, ExecutionIndex, FaultDecision};
use tracing::{debug, error, warn};

use super::session_registry::Session;
use crate::{
    error::ApplicationError,
    ports::{FaultOraclePort, OracleQuery, OutcomeReport},
};

/// Default bound on a single oracle round trip
pub const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(2);

/// Decides, per call, whether a fault is injected
#[derive(Clone)]
pub struct FaultDecisionService {
    oracle: Option<Arc<dyn FaultOraclePort>>,
    timeout: Duration,
    report_outcomes: bool,
    source_service: Option<String>,
}

impl fmt::Debug for FaultDecisionService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaultDecisionService")
            .field("has_oracle", &self.oracle.is_some())
            .field("timeout", &self.timeout)
            .field("report_outcomes", &self.report_outcomes)
            .field("source_service", &self.source_service)
            .finish()
    }
}

impl FaultDecisionService {
    /// Create a service backed by `oracle`
    #[must_use]
    pub fn new(oracle: Arc<dyn FaultOraclePort>, timeout: Duration) -> Self {
        Self {
            oracle: Some(oracle),
            timeout,
            report_outcomes: true,
            source_service: None,
        }
    }

    /// Create a service without an oracle; every call passes through
    #[must_use]
    pub const fn offline() -> Self {
        Self {
            oracle: None,
            timeout: DEFAULT_ORACLE_TIMEOUT,
            report_outcomes: false,
            source_service: None,
        }
    }

    /// Enable or disable outcome reports
    #[must_use]
    pub const fn with_outcome_reports(mut self, enabled: bool) -> Self {
        self.report_outcomes = enabled;
        self
    }

    /// Name the local service in every oracle query
    #[must_use]
    pub fn with_source_service(mut self, name: impl Into<String>) -> Self {
        self.source_service = Some(name.into());
        self
    }

    /// True if an oracle is configured
    pub const fn has_oracle(&self) -> bool {
        self.oracle.is_some()
    }

    /// Oracle round-trip bound
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Decide what to do with the call at `index` with `signature`
    ///
    /// The first decision for a key in a session is final; later calls with
    /// the same key get the cached value without contacting the oracle.
    pub async fn decide(
        &self,
        session: &Session,
        index: &ExecutionIndex,
        signature: &CallSignature,
    ) -> FaultDecision {
        if let Some(cached) = session.decisions().get(index, signature) {
            debug!(
                session_id = %session.id(),
                execution_index = %index,
                decision = cached.label(),
                "Decision cache hit"
            );
            return cached;
        }

        let decision = match &self.oracle {
            Some(oracle) => {
                let query = OracleQuery {
                    execution_index: index.clone(),
                    call_signature: signature.clone(),
                    session_id: session.id().clone(),
                    source_service: self.source_service.clone(),
                };
                match self.query_oracle(oracle.as_ref(), &query).await {
                    Ok(decision) => decision,
                    Err(e) if e.is_degradable() => {
                        warn!(
                            session_id = %session.id(),
                            execution_index = %index,
                            error = %e,
                            "Fault oracle unavailable, passing call through"
                        );
                        metrics::counter!("filibuster_oracle_fallbacks_total", "reason" => e.reason())
                            .increment(1);
                        FaultDecision::PassThrough
                    },
                    Err(e) => {
                        error!(
                            session_id = %session.id(),
                            execution_index = %index,
                            error = %e,
                            "Fault oracle misconfigured, passing call through"
                        );
                        metrics::counter!("filibuster_oracle_fallbacks_total", "reason" => e.reason())
                            .increment(1);
                        FaultDecision::PassThrough
                    },
                }
            },
            None => FaultDecision::PassThrough,
        };

        session
            .decisions()
            .insert_once(index.clone(), signature.clone(), decision)
    }

    async fn query_oracle(
        &self,
        oracle: &dyn FaultOraclePort,
        query: &OracleQuery,
    ) -> Result<FaultDecision, ApplicationError> {
        tokio::time::timeout(self.timeout, oracle.decide(query))
            .await
            .map_err(|_| ApplicationError::OracleTimeout(self.timeout))?
    }

    /// Send an outcome report in the background
    ///
    /// Best effort: failures are logged at `debug` and dropped. Without a
    /// running Tokio runtime the report is skipped.
    pub fn report_outcome(&self, report: OutcomeReport) {
        if !self.report_outcomes {
            return;
        }
        let Some(oracle) = self.oracle.clone() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("No runtime available, skipping outcome report");
            return;
        };
        let timeout = self.timeout;
        handle.spawn(async move {
            match tokio::time::timeout(timeout, oracle.report_outcome(&report)).await {
                Ok(Ok(())) => {},
                Ok(Err(e)) => debug!(error = %e, "Outcome report failed"),
                Err(_) => debug!(?timeout, "Outcome report timed out"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use async_trait::async_trait;
    use domain::SessionId;

    use super::*;
    use crate::ports::{CallResult, MockFaultOraclePort};

    fn session() -> Session {
        Session::new(SessionId::parse("S1").unwrap())
    }

    fn index() -> ExecutionIndex {
        ExecutionIndex::root()
            .child(domain::CallSiteId::new("svcA.rpc1").unwrap(), 0)
            .unwrap()
    }

    fn signature() -> CallSignature {
        CallSignature::new("svcA", "rpc1", b"{}")
    }

    struct SlowOracle(Duration);

    #[async_trait]
    impl FaultOraclePort for SlowOracle {
        async fn decide(&self, _query: &OracleQuery) -> Result<FaultDecision, ApplicationError> {
            tokio::time::sleep(self.0).await;
            Ok(FaultDecision::error("UNAVAILABLE"))
        }

        async fn report_outcome(&self, _report: &OutcomeReport) -> Result<(), ApplicationError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn offline_service_passes_through() {
        let service = FaultDecisionService::offline();
        let decision = service.decide(&session(), &index(), &signature()).await;
        assert_eq!(decision, FaultDecision::PassThrough);
        assert!(!service.has_oracle());
    }

    #[tokio::test]
    async fn oracle_decision_is_returned_and_cached() {
        let mut oracle = MockFaultOraclePort::new();
        oracle
            .expect_decide()
            .withf(|q| q.session_id.as_str() == "S1" && q.call_signature.method_name == "rpc1")
            .times(1)
            .returning(|_| Ok(FaultDecision::error("UNAVAILABLE")));

        let service = FaultDecisionService::new(Arc::new(oracle), Duration::from_secs(1));
        let session = session();

        let first = service.decide(&session, &index(), &signature()).await;
        let second = service.decide(&session, &index(), &signature()).await;

        assert_eq!(first, FaultDecision::error("UNAVAILABLE"));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn different_keys_query_separately() {
        let mut oracle = MockFaultOraclePort::new();
        oracle
            .expect_decide()
            .times(2)
            .returning(|_| Ok(FaultDecision::PassThrough));

        let service = FaultDecisionService::new(Arc::new(oracle), Duration::from_secs(1));
        let session = session();
        let sibling = ExecutionIndex::root()
            .child(domain::CallSiteId::new("svcA.rpc1").unwrap(), 1)
            .unwrap();

        service.decide(&session, &index(), &signature()).await;
        service.decide(&session, &sibling, &signature()).await;
        assert_eq!(session.decisions().len(), 2);
    }

    #[tokio::test]
    async fn oracle_error_falls_back_to_pass_through() {
        let mut oracle = MockFaultOraclePort::new();
        oracle
            .expect_decide()
            .times(1)
            .returning(|_| Err(ApplicationError::OracleUnreachable("connection refused".into())));

        let service = FaultDecisionService::new(Arc::new(oracle), Duration::from_secs(1));
        let session = session();
        let decision = service.decide(&session, &index(), &signature()).await;

        assert_eq!(decision, FaultDecision::PassThrough);
        // the fallback is final for this key
        assert_eq!(
            session.decisions().get(&index(), &signature()),
            Some(FaultDecision::PassThrough)
        );
    }

    #[tokio::test]
    async fn queries_name_the_source_service() {
        let mut oracle = MockFaultOraclePort::new();
        oracle
            .expect_decide()
            .withf(|q| q.source_service.as_deref() == Some("frontend"))
            .times(1)
            .returning(|_| Ok(FaultDecision::PassThrough));

        let service = FaultDecisionService::new(Arc::new(oracle), Duration::from_secs(1))
            .with_source_service("frontend");
        service.decide(&session(), &index(), &signature()).await;
    }

    #[tokio::test]
    async fn configuration_error_still_passes_through() {
        let mut oracle = MockFaultOraclePort::new();
        oracle
            .expect_decide()
            .times(1)
            .returning(|_| Err(ApplicationError::Configuration("no endpoint".into())));

        let service = FaultDecisionService::new(Arc::new(oracle), Duration::from_secs(1));
        let decision = service.decide(&session(), &index(), &signature()).await;

        assert_eq!(decision, FaultDecision::PassThrough);
    }

    #[tokio::test]
    async fn slow_oracle_times_out() {
        let service =
            FaultDecisionService::new(Arc::new(SlowOracle(Duration::from_secs(5))), Duration::from_millis(50));

        let started = Instant::now();
        let decision = service.decide(&session(), &index(), &signature()).await;

        assert_eq!(decision, FaultDecision::PassThrough);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn outcome_report_is_sent_in_background() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut oracle = MockFaultOraclePort::new();
        oracle.expect_report_outcome().times(1).returning(move |report| {
            let _ = tx.send(report.result.clone());
            Ok(())
        });

        let service = FaultDecisionService::new(Arc::new(oracle), Duration::from_secs(1));
        service.report_outcome(OutcomeReport {
            session_id: SessionId::parse("S1").unwrap(),
            execution_index: index(),
            call_signature: signature(),
            decision: FaultDecision::PassThrough,
            result: CallResult::Success,
        });

        let received = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert_eq!(received, Some(CallResult::Success));
    }

    #[tokio::test]
    async fn reports_can_be_disabled() {
        let mut oracle = MockFaultOraclePort::new();
        oracle.expect_report_outcome().never();

        let service = FaultDecisionService::new(Arc::new(oracle), Duration::from_secs(1))
            .with_outcome_reports(false);
        service.report_outcome(OutcomeReport {
            session_id: SessionId::parse("S1").unwrap(),
            execution_index: index(),
            call_signature: signature(),
            decision: FaultDecision::PassThrough,
            result: CallResult::Success,
        });
        tokio::task::yield_now().await;
    }
}
