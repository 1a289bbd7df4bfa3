//! Occurrence counter port

use domain::{CallSiteId, DomainError, ExecutionIndex};

/// Hands out per-(parent index, call site) occurrence counts
///
/// Implementations must be linearizable: concurrent callers for the same
/// key observe distinct, strictly increasing values starting at zero.
pub trait OccurrenceCounter: Send + Sync {
    /// Take the next occurrence count for `call_site` under `parent`
    fn next_occurrence(
        &self,
        parent: &ExecutionIndex,
        call_site: &CallSiteId,
    ) -> Result<u32, DomainError>;

    /// Number of distinct (parent, call site) keys tracked
    fn tracked_keys(&self) -> usize;
}
