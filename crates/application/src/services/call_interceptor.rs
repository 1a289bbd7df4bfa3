//! Call interceptor
//!
//! The framework-independent half of every adapter. An adapter wraps each
//! outbound call in an [`InterceptedCall`], asks [`CallInterceptor::before_call`]
//! what to do with it, and reports the observed result through
//! [`CallInterceptor::after_call`].

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use domain::{
    CallSignature, CallSiteId, CallState, ExecutionIndex, FaultDecision, InjectedFault, SessionId,
};
use tracing::{debug, warn};

use super::{
    context_propagator::{ContextPropagator, PropagatedMetadata},
    decision_service::FaultDecisionService,
    session_registry::{CallRecord, Session, SessionRegistry},
};
use crate::{
    call_context::ExecutionContext,
    ports::{CallResult, OutcomeReport},
};

/// Process-level interceptor switches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptorSettings {
    /// Name of the local service, reported to the oracle as the caller
    pub service_name: String,
    /// When false every call is passed through untouched
    pub enabled: bool,
}

impl Default for InterceptorSettings {
    fn default() -> Self {
        Self {
            service_name: "unknown-service".to_string(),
            enabled: true,
        }
    }
}

/// What the adapter must do with the call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterceptOutcome {
    /// Attach `metadata`, optionally wait `delay`, then send the real call
    Proceed {
        metadata: PropagatedMetadata,
        delay: Option<Duration>,
    },
    /// Do not send the call; manufacture this fault locally
    ShortCircuit(InjectedFault),
}

impl InterceptOutcome {
    fn bypass() -> Self {
        Self::Proceed {
            metadata: PropagatedMetadata::empty(),
            delay: None,
        }
    }
}

/// One outbound call moving through the interceptor
///
/// Dropping a call that has not completed marks it `Cancelled` and records
/// it in its session.
#[derive(Debug)]
pub struct InterceptedCall {
    call_site: CallSiteId,
    signature: CallSignature,
    state: CallState,
    bypass: bool,
    session: Option<Arc<Session>>,
    index: Option<ExecutionIndex>,
    decision: Option<FaultDecision>,
}

impl InterceptedCall {
    /// Wrap a call about to be issued from `call_site`
    #[must_use]
    pub const fn new(call_site: CallSiteId, signature: CallSignature) -> Self {
        Self {
            call_site,
            signature,
            state: CallState::Created,
            bypass: false,
            session: None,
            index: None,
            decision: None,
        }
    }

    /// Mark the call as instrumentation traffic that must not be intercepted
    #[must_use]
    pub const fn bypassed(mut self, bypass: bool) -> Self {
        self.bypass = bypass;
        self
    }

    pub const fn state(&self) -> CallState {
        self.state
    }

    pub const fn call_site(&self) -> &CallSiteId {
        &self.call_site
    }

    pub const fn signature(&self) -> &CallSignature {
        &self.signature
    }

    /// Index assigned to the call, if it got that far
    pub const fn index(&self) -> Option<&ExecutionIndex> {
        self.index.as_ref()
    }

    /// Decision applied to the call, if one was made
    pub const fn decision(&self) -> Option<&FaultDecision> {
        self.decision.as_ref()
    }

    /// Session the call was attributed to
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session.as_deref().map(Session::id)
    }

    fn transition(&mut self, next: CallState) {
        if self.state.can_transition_to(next) {
            self.state = next;
        } else {
            warn!(
                call_site = %self.call_site,
                from = %self.state,
                to = %next,
                "Ignoring illegal call state transition"
            );
        }
    }

    fn outcome_label(&self) -> &'static str {
        if self.state == CallState::Cancelled {
            return "cancelled";
        }
        self.decision.as_ref().map_or("bypass", FaultDecision::label)
    }

    fn record(&self, result: Option<CallResult>) {
        metrics::counter!("filibuster_intercepted_calls_total", "outcome" => self.outcome_label())
            .increment(1);
        if let Some(session) = &self.session {
            session.record(CallRecord {
                execution_index: self.index.clone(),
                call_signature: self.signature.clone(),
                decision: self.decision.clone(),
                state: self.state,
                result,
                recorded_at: Utc::now(),
            });
        }
    }
}

impl Drop for InterceptedCall {
    fn drop(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.transition(CallState::Cancelled);
        debug!(
            call_site = %self.call_site,
            execution_index = ?self.index.as_ref().map(ToString::to_string),
            "Intercepted call cancelled"
        );
        self.record(None);
    }
}

/// Drives intercepted calls through index assignment and fault decision
#[derive(Debug, Clone)]
pub struct CallInterceptor {
    registry: Arc<SessionRegistry>,
    decisions: FaultDecisionService,
    settings: InterceptorSettings,
}

impl CallInterceptor {
    /// Create a new interceptor
    #[must_use]
    pub const fn new(
        registry: Arc<SessionRegistry>,
        decisions: FaultDecisionService,
        settings: InterceptorSettings,
    ) -> Self {
        Self {
            registry,
            decisions,
            settings,
        }
    }

    pub const fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub const fn settings(&self) -> &InterceptorSettings {
        &self.settings
    }

    pub const fn decisions(&self) -> &FaultDecisionService {
        &self.decisions
    }

    /// Assign an index, attach metadata and decide the fate of `call`
    ///
    /// Never fails: every error path resolves to an untouched pass-through.
    pub async fn before_call(&self, call: &mut InterceptedCall) -> InterceptOutcome {
        if !self.settings.enabled || call.bypass {
            call.transition(CallState::PassedThrough);
            return InterceptOutcome::bypass();
        }

        let Some(ctx) = ExecutionContext::current() else {
            debug!(call_site = %call.call_site, "No execution context, passing call through");
            call.transition(CallState::PassedThrough);
            return InterceptOutcome::bypass();
        };

        let session = self.registry.get_or_create(ctx.session_id());
        let assigned = session
            .index_builder()
            .compute_child_index(Some(ctx.index()), &call.call_site)
            .and_then(|index| {
                let metadata =
                    ContextPropagator::encode(&index, ctx.session_id(), ctx.request_id())?;
                Ok((index, metadata))
            });
        let (index, metadata) = match assigned {
            Ok(assigned) => assigned,
            Err(e) => {
                debug!(
                    call_site = %call.call_site,
                    reason = e.reason(),
                    error = %e,
                    "Could not assign execution index, passing call through"
                );
                call.transition(CallState::PassedThrough);
                return InterceptOutcome::bypass();
            },
        };

        call.index = Some(index.clone());
        call.session = Some(Arc::clone(&session));
        call.transition(CallState::IndexAssigned);

        call.transition(CallState::DecisionPending);
        let decision = self.decisions.decide(&session, &index, &call.signature).await;
        debug!(
            session_id = %session.id(),
            execution_index = %index,
            call_site = %call.call_site,
            signature = %call.signature,
            decision = decision.label(),
            "Call intercepted"
        );

        let outcome = match decision.short_circuit() {
            Some(fault) => {
                call.transition(CallState::Faulted);
                InterceptOutcome::ShortCircuit(fault)
            },
            None => {
                call.transition(CallState::PassedThrough);
                let mut metadata = metadata;
                let delay = decision.delay();
                if let Some(delay) = delay {
                    ContextPropagator::attach_forced_sleep(&mut metadata, delay);
                }
                InterceptOutcome::Proceed { metadata, delay }
            },
        };
        call.decision = Some(decision);
        outcome
    }

    /// Record how `call` ended and report it to the oracle
    ///
    /// Calling this more than once has no further effect.
    pub fn after_call(&self, call: &mut InterceptedCall, result: CallResult) {
        if call.state.is_terminal() {
            return;
        }
        if call.state == CallState::Created {
            call.transition(CallState::PassedThrough);
        }
        call.transition(CallState::Completed);
        call.record(Some(result.clone()));

        if let (Some(session), Some(index), Some(decision)) =
            (&call.session, &call.index, &call.decision)
        {
            self.decisions.report_outcome(OutcomeReport {
                session_id: session.id().clone(),
                execution_index: index.clone(),
                call_signature: call.signature.clone(),
                decision: decision.clone(),
                result,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::{
        error::ApplicationError,
        ports::{FaultOraclePort, MockFaultOraclePort, OracleQuery},
        services::context_propagator::{EXECUTION_INDEX_KEY, FORCED_SLEEP_KEY, SESSION_ID_KEY},
    };

    fn session_id(s: &str) -> SessionId {
        SessionId::parse(s).unwrap()
    }

    fn new_call() -> InterceptedCall {
        InterceptedCall::new(
            CallSiteId::new("svcA.rpc1").unwrap(),
            CallSignature::new("svcA", "rpc1", b"{\"id\":1}"),
        )
    }

    fn interceptor(oracle: MockFaultOraclePort) -> CallInterceptor {
        CallInterceptor::new(
            Arc::new(SessionRegistry::new()),
            FaultDecisionService::new(Arc::new(oracle), Duration::from_secs(1))
                .with_outcome_reports(false),
            InterceptorSettings::default(),
        )
    }

    fn decoded_count(metadata: &PropagatedMetadata) -> u32 {
        let encoded = metadata.get(EXECUTION_INDEX_KEY).unwrap();
        ContextPropagator::decode_index(encoded)
            .unwrap()
            .leaf()
            .unwrap()
            .occurrence_count
    }

    #[tokio::test]
    async fn oracle_error_short_circuits_call() {
        let mut oracle = MockFaultOraclePort::new();
        oracle
            .expect_decide()
            .times(1)
            .returning(|_| Ok(FaultDecision::error("UNAVAILABLE")));
        let interceptor = interceptor(oracle);
        interceptor.registry().start(session_id("S1"));

        let mut call = new_call();
        let outcome = ExecutionContext::root(session_id("S1"))
            .scope(interceptor.before_call(&mut call))
            .await;

        assert_eq!(
            outcome,
            InterceptOutcome::ShortCircuit(InjectedFault::Error {
                kind: "UNAVAILABLE".to_string(),
                detail: None,
            })
        );
        assert_eq!(call.state(), CallState::Faulted);
        assert_eq!(call.index().unwrap().to_string(), "[svcA.rpc1#0]");

        interceptor.after_call(&mut call, CallResult::failure("UNAVAILABLE"));
        assert_eq!(call.state(), CallState::Completed);

        let snapshot = interceptor.registry().snapshot(&session_id("S1")).unwrap();
        assert_eq!(snapshot.stats.calls, 1);
        assert_eq!(snapshot.stats.faulted, 1);
        assert_eq!(snapshot.calls[0].state, CallState::Completed);
    }

    #[tokio::test]
    async fn missing_context_passes_through_without_oracle() {
        let mut oracle = MockFaultOraclePort::new();
        oracle.expect_decide().never();
        let interceptor = interceptor(oracle);

        let mut call = new_call();
        let outcome = interceptor.before_call(&mut call).await;

        assert_eq!(outcome, InterceptOutcome::bypass());
        assert_eq!(call.state(), CallState::PassedThrough);
        assert!(call.index().is_none());

        interceptor.after_call(&mut call, CallResult::Success);
        assert_eq!(call.state(), CallState::Completed);
    }

    #[tokio::test]
    async fn disabled_and_instrumentation_calls_bypass() {
        let mut oracle = MockFaultOraclePort::new();
        oracle.expect_decide().never();
        let disabled = CallInterceptor::new(
            Arc::new(SessionRegistry::new()),
            FaultDecisionService::new(Arc::new(oracle), Duration::from_secs(1)),
            InterceptorSettings {
                enabled: false,
                ..InterceptorSettings::default()
            },
        );
        let ctx = ExecutionContext::root(session_id("S1"));

        let mut call = new_call();
        let outcome = ctx.clone().scope(disabled.before_call(&mut call)).await;
        assert_eq!(outcome, InterceptOutcome::bypass());

        let enabled = CallInterceptor::new(
            Arc::clone(disabled.registry()),
            FaultDecisionService::offline(),
            InterceptorSettings::default(),
        );
        let mut own_traffic = new_call().bypassed(true);
        let outcome = ctx.scope(enabled.before_call(&mut own_traffic)).await;
        assert_eq!(outcome, InterceptOutcome::bypass());
        assert_eq!(own_traffic.state(), CallState::PassedThrough);
    }

    #[tokio::test]
    async fn latency_decision_proceeds_with_delay_and_metadata() {
        let mut oracle = MockFaultOraclePort::new();
        oracle
            .expect_decide()
            .returning(|_| Ok(FaultDecision::latency(Duration::from_millis(25))));
        let interceptor = interceptor(oracle);

        let mut call = new_call();
        let outcome = ExecutionContext::root(session_id("S1"))
            .scope(interceptor.before_call(&mut call))
            .await;

        let InterceptOutcome::Proceed { metadata, delay } = outcome else {
            panic!("expected proceed, got {outcome:?}");
        };
        assert_eq!(delay, Some(Duration::from_millis(25)));
        assert_eq!(metadata.get(SESSION_ID_KEY), Some("S1"));
        assert_eq!(metadata.get(FORCED_SLEEP_KEY), Some("25"));
        assert_eq!(decoded_count(&metadata), 0);
        assert_eq!(call.state(), CallState::PassedThrough);
    }

    #[tokio::test]
    async fn concurrent_calls_get_distinct_indices() {
        let mut oracle = MockFaultOraclePort::new();
        oracle
            .expect_decide()
            .times(2)
            .returning(|_| Ok(FaultDecision::PassThrough));
        let interceptor = interceptor(oracle);

        let (left, right) = ExecutionContext::root(session_id("S1"))
            .scope(async {
                let mut a = new_call();
                let mut b = new_call();
                let (oa, ob) = tokio::join!(interceptor.before_call(&mut a), interceptor.before_call(&mut b));
                interceptor.after_call(&mut a, CallResult::Success);
                interceptor.after_call(&mut b, CallResult::Success);
                (oa, ob)
            })
            .await;

        let counts: BTreeSet<u32> = [left, right]
            .iter()
            .map(|outcome| match outcome {
                InterceptOutcome::Proceed { metadata, .. } => decoded_count(metadata),
                InterceptOutcome::ShortCircuit(_) => panic!("unexpected fault"),
            })
            .collect();
        assert_eq!(counts, BTreeSet::from([0, 1]));
    }

    #[tokio::test]
    async fn dropped_call_is_recorded_as_cancelled() {
        let mut oracle = MockFaultOraclePort::new();
        oracle
            .expect_decide()
            .returning(|_| Ok(FaultDecision::PassThrough));
        let interceptor = interceptor(oracle);

        let mut call = new_call();
        ExecutionContext::root(session_id("S1"))
            .scope(interceptor.before_call(&mut call))
            .await;
        drop(call);

        let snapshot = interceptor.registry().snapshot(&session_id("S1")).unwrap();
        assert_eq!(snapshot.stats.cancelled, 1);
        assert_eq!(snapshot.calls[0].state, CallState::Cancelled);
        assert!(snapshot.calls[0].result.is_none());
    }

    struct StalledOracle;

    #[async_trait::async_trait]
    impl FaultOraclePort for StalledOracle {
        async fn decide(&self, _query: &OracleQuery) -> Result<FaultDecision, ApplicationError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(FaultDecision::PassThrough)
        }

        async fn report_outcome(&self, _report: &OutcomeReport) -> Result<(), ApplicationError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn call_abandoned_while_awaiting_decision_is_cancelled_once() {
        let interceptor = CallInterceptor::new(
            Arc::new(SessionRegistry::new()),
            FaultDecisionService::new(Arc::new(StalledOracle), Duration::from_secs(5))
                .with_outcome_reports(false),
            InterceptorSettings::default(),
        );

        let pending = ExecutionContext::root(session_id("S1")).scope(async {
            let mut call = new_call();
            interceptor.before_call(&mut call).await;
            call
        });
        let abandoned = tokio::time::timeout(Duration::from_millis(50), pending).await;
        assert!(abandoned.is_err());

        let snapshot = interceptor.registry().snapshot(&session_id("S1")).unwrap();
        assert_eq!(snapshot.stats.calls, 1);
        assert_eq!(snapshot.stats.cancelled, 1);
        assert_eq!(snapshot.calls.len(), 1);
        assert_eq!(snapshot.calls[0].state, CallState::Cancelled);
        assert!(snapshot.calls[0].decision.is_none());
        assert!(snapshot.calls[0].execution_index.is_some());
    }

    #[tokio::test]
    async fn after_call_is_idempotent() {
        let mut oracle = MockFaultOraclePort::new();
        oracle
            .expect_decide()
            .returning(|_| Err(ApplicationError::OracleUnreachable("down".into())));
        let interceptor = interceptor(oracle);

        let mut call = new_call();
        ExecutionContext::root(session_id("S1"))
            .scope(interceptor.before_call(&mut call))
            .await;
        interceptor.after_call(&mut call, CallResult::Success);
        interceptor.after_call(&mut call, CallResult::failure("INTERNAL"));

        let snapshot = interceptor.registry().snapshot(&session_id("S1")).unwrap();
        assert_eq!(snapshot.stats.calls, 1);
        assert_eq!(snapshot.calls[0].result, Some(CallResult::Success));
    }
}
