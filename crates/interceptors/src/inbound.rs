//! Context restoration for inbound requests

use application::{CallInterceptor, ContextPropagator, ExecutionContext};
use axum::http::HeaderMap;
use tracing::debug;
use uuid::Uuid;

use crate::metadata::HeaderView;

/// Execution context to run an inbound request under
///
/// Requests carrying valid metadata continue the caller's index in the
/// caller's session. Anything else starts a root index in the ambient
/// session. Returns `None` when instrumentation is disabled.
pub(crate) fn inbound_context(
    interceptor: &CallInterceptor,
    headers: &HeaderMap,
) -> Option<ExecutionContext> {
    if !interceptor.settings().enabled {
        return None;
    }
    let registry = interceptor.registry();
    let ctx = match ContextPropagator::decode(&HeaderView(headers)) {
        Some(decoded) => {
            registry.get_or_create(&decoded.session_id);
            ExecutionContext::new(
                decoded.session_id,
                decoded.index,
                decoded.request_id.unwrap_or_else(Uuid::new_v4),
            )
        },
        None => {
            let session = registry.ambient();
            debug!(session_id = %session.id(), "No propagated context, starting at root");
            ExecutionContext::root(session.id().clone())
        },
    };
    Some(ctx)
}
