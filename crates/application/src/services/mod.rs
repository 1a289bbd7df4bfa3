//! Application services - Use case implementations

mod call_interceptor;
mod context_propagator;
mod decision_service;
mod index_builder;
mod session_registry;

pub use call_interceptor::{CallInterceptor, InterceptOutcome, InterceptedCall, InterceptorSettings};
pub use context_propagator::{
    ContextPropagator, DecodedContext, EXECUTION_INDEX_KEY, FORCED_SLEEP_KEY, INSTRUMENTATION_KEY,
    MAX_ENCODED_INDEX_LEN, METADATA_PREFIX, MetadataCarrier, PropagatedMetadata, REQUEST_ID_KEY,
    SESSION_ID_KEY,
};
pub use decision_service::{DEFAULT_ORACLE_TIMEOUT, FaultDecisionService};
pub use index_builder::{ExecutionIndexBuilder, LockedOccurrenceCounter};
pub use session_registry::{
    CallRecord, DEFAULT_MAX_CALL_LOG, DecisionCache, Session, SessionLimits, SessionRegistry,
    SessionSnapshot, SessionStats, StatsSnapshot,
};
