//! Session registry and per-session state
//!
//! A session groups everything observed during one test execution: the
//! occurrence counters behind execution indices, the write-once decision
//! cache, and a log of completed calls. Sessions are addressed by id so that
//! concurrent test executions in one process never share state.
//!
//! Sessions started by a harness live until the harness ends them. Sessions
//! created implicitly from inbound traffic are evicted once idle for
//! [`SessionLimits::idle_ttl`], and their number is capped.

use std::{
    collections::{HashMap, VecDeque},
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use domain::{CallSignature, CallState, ExecutionIndex, FaultDecision, SessionId};
use moka::{notification::RemovalCause, sync::Cache};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info};

use super::index_builder::ExecutionIndexBuilder;
use crate::ports::CallResult;

/// Default number of call records kept per session
pub const DEFAULT_MAX_CALL_LOG: usize = 10_000;

/// Decisions made within one session, keyed by (index, signature)
#[derive(Debug, Default)]
pub struct DecisionCache {
    entries: Mutex<HashMap<(ExecutionIndex, CallSignature), FaultDecision>>,
}

impl DecisionCache {
    /// Look up a cached decision
    pub fn get(&self, index: &ExecutionIndex, signature: &CallSignature) -> Option<FaultDecision> {
        self.entries
            .lock()
            .get(&(index.clone(), signature.clone()))
            .cloned()
    }

    /// Store `decision` unless a decision already exists for the key
    ///
    /// Returns the decision that is in the cache afterwards, which is the
    /// earlier one if another caller got there first.
    pub fn insert_once(
        &self,
        index: ExecutionIndex,
        signature: CallSignature,
        decision: FaultDecision,
    ) -> FaultDecision {
        self.entries
            .lock()
            .entry((index, signature))
            .or_insert(decision)
            .clone()
    }

    /// Number of cached decisions
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True if nothing has been decided yet
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// One intercepted call as recorded in the session log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    /// Absent for calls bypassed before an index was assigned
    pub execution_index: Option<ExecutionIndex>,
    pub call_signature: CallSignature,
    pub decision: Option<FaultDecision>,
    /// Final state: `Completed` or `Cancelled`
    pub state: CallState,
    pub result: Option<CallResult>,
    pub recorded_at: DateTime<Utc>,
}

/// Running counters for one session
#[derive(Debug, Default)]
pub struct SessionStats {
    calls: AtomicU64,
    faulted: AtomicU64,
    passed_through: AtomicU64,
    cancelled: AtomicU64,
    failures: AtomicU64,
    dropped_records: AtomicU64,
}

impl SessionStats {
    fn observe(&self, record: &CallRecord) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if record.state == CallState::Cancelled {
            self.cancelled.fetch_add(1, Ordering::Relaxed);
        }
        match &record.decision {
            Some(decision) if decision.is_fault() => {
                self.faulted.fetch_add(1, Ordering::Relaxed);
            },
            _ => {
                self.passed_through.fetch_add(1, Ordering::Relaxed);
            },
        }
        if matches!(record.result, Some(CallResult::Failure { .. })) {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            calls: self.calls.load(Ordering::Relaxed),
            faulted: self.faulted.load(Ordering::Relaxed),
            passed_through: self.passed_through.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            dropped_records: self.dropped_records.load(Ordering::Relaxed),
        }
    }
}

/// Serializable view of [`SessionStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub calls: u64,
    /// Calls with a fault decision (error, latency or corruption)
    pub faulted: u64,
    pub passed_through: u64,
    pub cancelled: u64,
    /// Calls whose observed result was a failure, injected or real
    pub failures: u64,
    /// Oldest call records pushed out of the bounded log
    pub dropped_records: u64,
}

/// State of one test execution
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    started_at: DateTime<Utc>,
    index_builder: ExecutionIndexBuilder,
    decisions: DecisionCache,
    calls: Mutex<VecDeque<CallRecord>>,
    max_call_log: usize,
    stats: SessionStats,
}

impl Session {
    /// Create an empty session
    #[must_use]
    pub fn new(id: SessionId) -> Self {
        Self::with_call_log_limit(id, DEFAULT_MAX_CALL_LOG)
    }

    /// Create an empty session keeping at most `max_call_log` call records
    #[must_use]
    pub fn with_call_log_limit(id: SessionId, max_call_log: usize) -> Self {
        Self {
            id,
            started_at: Utc::now(),
            index_builder: ExecutionIndexBuilder::default(),
            decisions: DecisionCache::default(),
            calls: Mutex::new(VecDeque::new()),
            max_call_log: max_call_log.max(1),
            stats: SessionStats::default(),
        }
    }

    pub const fn id(&self) -> &SessionId {
        &self.id
    }

    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Index builder scoped to this session's counters
    pub const fn index_builder(&self) -> &ExecutionIndexBuilder {
        &self.index_builder
    }

    /// Decision cache scoped to this session
    pub const fn decisions(&self) -> &DecisionCache {
        &self.decisions
    }

    pub const fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Append a finished call to the log, dropping the oldest record when full
    pub fn record(&self, record: CallRecord) {
        self.stats.observe(&record);
        let mut calls = self.calls.lock();
        if calls.len() >= self.max_call_log {
            calls.pop_front();
            self.stats.dropped_records.fetch_add(1, Ordering::Relaxed);
        }
        calls.push_back(record);
    }

    /// Copy of the retained call log in completion order
    pub fn calls(&self) -> Vec<CallRecord> {
        self.calls.lock().iter().cloned().collect()
    }

    /// Everything a harness needs to inspect this session
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            started_at: self.started_at,
            cached_decisions: self.decisions.len(),
            stats: self.stats.snapshot(),
            calls: self.calls(),
        }
    }
}

/// Serializable view of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub started_at: DateTime<Utc>,
    pub cached_decisions: usize,
    pub stats: StatsSnapshot,
    pub calls: Vec<CallRecord>,
}

/// Memory bounds for the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    /// Call records kept per session
    pub max_call_log: usize,
    /// Idle time after which an implicitly created session is evicted
    pub idle_ttl: Duration,
    /// Implicitly created sessions kept at once
    pub max_implicit_sessions: u64,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_call_log: DEFAULT_MAX_CALL_LOG,
            idle_ttl: Duration::from_secs(1800),
            max_implicit_sessions: 10_000,
        }
    }
}

/// Process-wide table of live sessions
///
/// Lock order: `ambient` before `started` whenever both are held.
pub struct SessionRegistry {
    started: RwLock<HashMap<SessionId, Arc<Session>>>,
    implicit: Cache<SessionId, Arc<Session>>,
    ambient: RwLock<Option<SessionId>>,
    default_id: Option<SessionId>,
    limits: SessionLimits,
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("started", &self.started.read().len())
            .field("implicit", &self.implicit.entry_count())
            .field("ambient", &*self.ambient.read())
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    /// Create an empty registry with default limits
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(None, SessionLimits::default())
    }

    /// Create a registry whose ambient session defaults to `default_id`
    #[must_use]
    pub fn with_default_session(default_id: Option<SessionId>) -> Self {
        Self::with_limits(default_id, SessionLimits::default())
    }

    /// Create a registry with explicit memory bounds
    #[must_use]
    pub fn with_limits(default_id: Option<SessionId>, limits: SessionLimits) -> Self {
        let implicit = Cache::builder()
            .max_capacity(limits.max_implicit_sessions)
            .time_to_idle(limits.idle_ttl)
            .eviction_listener(|id: Arc<SessionId>, _session: Arc<Session>, cause: RemovalCause| {
                if cause.was_evicted() {
                    debug!(session_id = %id, ?cause, "Implicit session evicted");
                    metrics::counter!("filibuster_sessions_total", "event" => "evicted").increment(1);
                }
            })
            .build();
        Self {
            started: RwLock::new(HashMap::new()),
            implicit,
            ambient: RwLock::new(None),
            default_id,
            limits,
        }
    }

    pub const fn limits(&self) -> &SessionLimits {
        &self.limits
    }

    /// Start (or rejoin) a session and make it the ambient one
    ///
    /// A session already created implicitly is kept, and is no longer
    /// subject to idle eviction. Returns the session and whether it was
    /// newly created.
    pub fn start(&self, id: SessionId) -> (Arc<Session>, bool) {
        let mut started = self.started.write();
        let (session, created) = if let Some(existing) = started.get(&id) {
            (Arc::clone(existing), false)
        } else if let Some(adopted) = self.implicit.remove(&id) {
            started.insert(id.clone(), Arc::clone(&adopted));
            debug!(session_id = %id, "Implicit session adopted by harness");
            (adopted, false)
        } else {
            let session = Arc::new(self.new_session(id.clone()));
            started.insert(id.clone(), Arc::clone(&session));
            (session, true)
        };
        drop(started);

        *self.ambient.write() = Some(id.clone());
        if created {
            info!(session_id = %id, "Session started");
            metrics::counter!("filibuster_sessions_total", "event" => "started").increment(1);
        }
        (session, created)
    }

    /// End a session, discarding its counters, cache and log
    pub fn end(&self, id: &SessionId) -> Option<SessionSnapshot> {
        let removed = self.started.write().remove(id);
        let removed = removed.or_else(|| self.implicit.remove(id))?;
        {
            let mut ambient = self.ambient.write();
            if ambient.as_ref() == Some(id) {
                *ambient = None;
            }
        }
        let snapshot = removed.snapshot();
        info!(
            session_id = %id,
            calls = snapshot.stats.calls,
            faulted = snapshot.stats.faulted,
            "Session ended"
        );
        metrics::counter!("filibuster_sessions_total", "event" => "ended").increment(1);
        Some(snapshot)
    }

    /// Look up a live session
    pub fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        let started = self.started.read().get(id).cloned();
        started.or_else(|| self.implicit.get(id))
    }

    /// Look up a session, creating it on first sight
    pub fn get_or_create(&self, id: &SessionId) -> Arc<Session> {
        let started = self.started.read();
        if let Some(existing) = started.get(id) {
            return Arc::clone(existing);
        }
        let entry = self
            .implicit
            .entry(id.clone())
            .or_insert_with(|| Arc::new(self.new_session(id.clone())));
        drop(started);

        if entry.is_fresh() {
            info!(session_id = %id, "Session created implicitly");
            metrics::counter!("filibuster_sessions_total", "event" => "implicit").increment(1);
        }
        entry.into_value()
    }

    /// The session for traffic that carries no session of its own
    ///
    /// This is the most recently started session if it is still live,
    /// otherwise the configured default session, otherwise a generated one.
    /// An evicted ambient session comes back under the same id.
    pub fn ambient(&self) -> Arc<Session> {
        let current = self.ambient.read().clone();
        if let Some(session) = current.and_then(|id| self.get(&id)) {
            return session;
        }

        let mut ambient = self.ambient.write();
        if let Some(session) = ambient.as_ref().and_then(|id| self.get(id)) {
            return session;
        }
        let id = ambient
            .as_ref()
            .or(self.default_id.as_ref())
            .cloned()
            .unwrap_or_else(SessionId::generate);
        let session = self.get_or_create(&id);
        *ambient = Some(id);
        session
    }

    /// Snapshot of a live session
    pub fn snapshot(&self, id: &SessionId) -> Option<SessionSnapshot> {
        self.get(id).map(|s| s.snapshot())
    }

    /// Number of live sessions, after applying pending evictions
    pub fn len(&self) -> usize {
        self.implicit.run_pending_tasks();
        let implicit = usize::try_from(self.implicit.entry_count()).unwrap_or(usize::MAX);
        self.started.read().len().saturating_add(implicit)
    }

    /// True if no session is live
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn new_session(&self, id: SessionId) -> Session {
        Session::with_call_log_limit(id, self.limits.max_call_log)
    }
}
