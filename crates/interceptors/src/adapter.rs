//! Shared interception driver
//!
//! Each framework adapter only knows how to attach metadata to its request
//! type, how to fake a response for an injected fault and how to read a
//! result back. [`intercept`] runs the common lifecycle around those three
//! capabilities.

use std::future::Future;

use application::{CallInterceptor, CallResult, InterceptOutcome, InterceptedCall, PropagatedMetadata};
use domain::{CallSiteId, InjectedFault};
use tracing::debug;

/// Framework-specific half of an interceptor
pub trait RpcAdapter {
    type Request;
    type Response;
    type Error;

    /// Attach propagated metadata to an outbound request
    fn attach_metadata(&self, request: &mut Self::Request, metadata: &PropagatedMetadata);

    /// Build the native response the caller sees for an injected fault
    fn manufacture(&self, fault: &InjectedFault) -> Self::Response;

    /// Classify what the caller observed
    fn classify(&self, result: &Result<Self::Response, Self::Error>) -> CallResult;
}

/// Call site chosen by the caller for an outbound request
///
/// Two places in a handler that call the same remote method share a call
/// site (`service.method`) unless one of them is labelled. For gRPC insert
/// the label into the request extensions; for HTTP pass it to
/// [`InstrumentedRequestBuilder::call_site`](crate::InstrumentedRequestBuilder::call_site).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSiteLabel(pub CallSiteId);

/// Drive one outbound call through the interceptor
///
/// Short-circuited calls never reach `send`. Dropping the returned future
/// drops the call, which then records itself as cancelled.
pub async fn intercept<A, F, Fut>(
    interceptor: &CallInterceptor,
    adapter: &A,
    mut call: InterceptedCall,
    mut request: A::Request,
    send: F,
) -> Result<A::Response, A::Error>
where
    A: RpcAdapter,
    F: FnOnce(A::Request) -> Fut,
    Fut: Future<Output = Result<A::Response, A::Error>>,
{
    match interceptor.before_call(&mut call).await {
        InterceptOutcome::ShortCircuit(fault) => {
            let result = Ok(adapter.manufacture(&fault));
            interceptor.after_call(&mut call, adapter.classify(&result));
            result
        },
        InterceptOutcome::Proceed { metadata, delay } => {
            adapter.attach_metadata(&mut request, &metadata);
            if let Some(delay) = delay {
                debug!(call_site = %call.call_site(), delay = ?delay, "Injecting latency");
                tokio::time::sleep(delay).await;
            }
            let result = send(request).await;
            interceptor.after_call(&mut call, adapter.classify(&result));
            result
        },
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::BTreeMap,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use application::{
        EXECUTION_INDEX_KEY, ExecutionContext, FaultDecisionService, InterceptorSettings,
        MetadataCarrier, SessionRegistry,
    };
    use domain::{CallSignature, CallState, FaultDecision, SessionId};
    use infrastructure::{FaultRule, ScriptedFaultOracle};

    use super::*;

    /// Requests and responses are plain strings; failures are `Err(code)`
    struct StringAdapter;

    impl RpcAdapter for StringAdapter {
        type Request = BTreeMap<String, String>;
        type Response = String;
        type Error = String;

        fn attach_metadata(&self, request: &mut Self::Request, metadata: &PropagatedMetadata) {
            for (key, value) in metadata.iter() {
                request.set(key, value.to_string());
            }
        }

        fn manufacture(&self, fault: &InjectedFault) -> Self::Response {
            match fault {
                InjectedFault::Error { kind, .. } => format!("error:{kind}"),
                InjectedFault::CorruptedResponse { payload } => {
                    String::from_utf8_lossy(payload).into_owned()
                },
            }
        }

        fn classify(&self, result: &Result<Self::Response, Self::Error>) -> CallResult {
            match result {
                Ok(body) => body
                    .strip_prefix("error:")
                    .map_or(CallResult::Success, CallResult::failure),
                Err(code) => CallResult::failure(code.clone()),
            }
        }
    }

    fn interceptor(rules: Vec<FaultRule>) -> CallInterceptor {
        CallInterceptor::new(
            Arc::new(SessionRegistry::new()),
            FaultDecisionService::new(Arc::new(ScriptedFaultOracle::new(rules)), Duration::from_secs(1))
                .with_outcome_reports(false),
            InterceptorSettings::default(),
        )
    }

    fn new_call() -> InterceptedCall {
        InterceptedCall::new(
            CallSiteId::new("svcA.rpc1").unwrap(),
            CallSignature::new("svcA", "rpc1", b""),
        )
    }

    fn in_session<F: Future>(future: F) -> impl Future<Output = F::Output> {
        ExecutionContext::root(SessionId::parse("S1").unwrap()).scope(future)
    }

    #[tokio::test]
    async fn pass_through_attaches_metadata_and_sends() {
        let interceptor = interceptor(vec![]);
        let result = in_session(intercept(
            &interceptor,
            &StringAdapter,
            new_call(),
            BTreeMap::new(),
            |request: BTreeMap<String, String>| async move {
                assert!(request.contains_key(EXECUTION_INDEX_KEY));
                Ok::<_, String>("ok".to_string())
            },
        ))
        .await;
        assert_eq!(result.unwrap(), "ok");

        let snapshot = interceptor
            .registry()
            .snapshot(&SessionId::parse("S1").unwrap())
            .unwrap();
        assert_eq!(snapshot.calls[0].state, CallState::Completed);
        assert_eq!(snapshot.stats.passed_through, 1);
    }

    #[tokio::test]
    async fn error_fault_never_sends() {
        let interceptor = interceptor(vec![FaultRule::new(FaultDecision::error("UNAVAILABLE"))]);
        let counter = AtomicUsize::new(0);
        let sent = &counter;
        let result = in_session(intercept(
            &interceptor,
            &StringAdapter,
            new_call(),
            BTreeMap::new(),
            move |_| async move {
                sent.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>("ok".to_string())
            },
        ))
        .await;

        assert_eq!(result.unwrap(), "error:UNAVAILABLE");
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        let snapshot = interceptor
            .registry()
            .snapshot(&SessionId::parse("S1").unwrap())
            .unwrap();
        assert_eq!(snapshot.stats.faulted, 1);
        assert_eq!(snapshot.stats.failures, 1);
    }

    #[tokio::test]
    async fn transport_error_is_recorded_as_failure() {
        let interceptor = interceptor(vec![]);
        let result = in_session(intercept(
            &interceptor,
            &StringAdapter,
            new_call(),
            BTreeMap::new(),
            |_| async { Err::<String, _>("UNAVAILABLE".to_string()) },
        ))
        .await;

        assert!(result.is_err());
        let snapshot = interceptor
            .registry()
            .snapshot(&SessionId::parse("S1").unwrap())
            .unwrap();
        assert_eq!(snapshot.calls[0].result, Some(CallResult::failure("UNAVAILABLE")));
    }

    #[tokio::test]
    async fn latency_fault_delays_then_sends() {
        let interceptor = interceptor(vec![FaultRule::new(FaultDecision::latency(
            Duration::from_millis(50),
        ))]);
        let started = std::time::Instant::now();
        let result = in_session(intercept(
            &interceptor,
            &StringAdapter,
            new_call(),
            BTreeMap::new(),
            |_| async { Ok::<_, String>("late".to_string()) },
        ))
        .await;

        assert_eq!(result.unwrap(), "late");
        assert!(started.elapsed() >= Duration::from_millis(50));
    }
}
