//! Execution index builder
//!
//! Derives the index of an outbound call from the caller's own index plus
//! the next occurrence count for the call site.

use std::{collections::HashMap, fmt, sync::Arc};

use domain::{CallSiteId, DomainError, ExecutionIndex, MAX_INDEX_DEPTH};
use parking_lot::Mutex;

use crate::{error::ApplicationError, ports::OccurrenceCounter};

/// Occurrence counter backed by a locked map
#[derive(Debug, Default)]
pub struct LockedOccurrenceCounter {
    counts: Mutex<HashMap<(ExecutionIndex, CallSiteId), u32>>,
}

impl LockedOccurrenceCounter {
    /// Create an empty counter
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl OccurrenceCounter for LockedOccurrenceCounter {
    fn next_occurrence(
        &self,
        parent: &ExecutionIndex,
        call_site: &CallSiteId,
    ) -> Result<u32, DomainError> {
        let mut counts = self.counts.lock();
        let slot = counts
            .entry((parent.clone(), call_site.clone()))
            .or_insert(0);
        let current = *slot;
        *slot = current
            .checked_add(1)
            .ok_or_else(|| DomainError::OccurrenceOverflow(call_site.to_string()))?;
        Ok(current)
    }

    fn tracked_keys(&self) -> usize {
        self.counts.lock().len()
    }
}

/// Computes child execution indices for one session
#[derive(Clone)]
pub struct ExecutionIndexBuilder {
    counter: Arc<dyn OccurrenceCounter>,
}

impl fmt::Debug for ExecutionIndexBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionIndexBuilder")
            .field("tracked_keys", &self.counter.tracked_keys())
            .finish()
    }
}

impl Default for ExecutionIndexBuilder {
    fn default() -> Self {
        Self::new(Arc::new(LockedOccurrenceCounter::new()))
    }
}

impl ExecutionIndexBuilder {
    /// Create a builder over the given counter
    #[must_use]
    pub fn new(counter: Arc<dyn OccurrenceCounter>) -> Self {
        Self { counter }
    }

    /// Compute the index of the next call from `call_site` under `parent`
    ///
    /// Fails with [`ApplicationError::MissingContext`] when there is no
    /// parent index, i.e. the call happens outside any tracked session. A
    /// parent already at the depth limit is rejected without consuming an
    /// occurrence.
    pub fn compute_child_index(
        &self,
        parent: Option<&ExecutionIndex>,
        call_site: &CallSiteId,
    ) -> Result<ExecutionIndex, ApplicationError> {
        let parent =
            parent.ok_or_else(|| ApplicationError::MissingContext(call_site.to_string()))?;
        if parent.depth() >= MAX_INDEX_DEPTH {
            return Err(DomainError::IndexTooDeep {
                depth: parent.depth() + 1,
                max: MAX_INDEX_DEPTH,
            }
            .into());
        }
        let occurrence = self.counter.next_occurrence(parent, call_site)?;
        Ok(parent.child(call_site.clone(), occurrence)?)
    }

    /// Number of distinct (parent, call site) keys seen so far
    pub fn tracked_keys(&self) -> usize {
        self.counter.tracked_keys()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use domain::IndexSegment;
    use proptest::prelude::*;

    use super::*;

    fn site(s: &str) -> CallSiteId {
        CallSiteId::new(s).unwrap()
    }

    #[test]
    fn missing_parent_is_missing_context() {
        let builder = ExecutionIndexBuilder::default();
        let result = builder.compute_child_index(None, &site("svcA.rpc1"));
        assert!(matches!(result, Err(ApplicationError::MissingContext(ref s)) if s == "svcA.rpc1"));
    }

    #[test]
    fn sequential_siblings_count_up_from_zero() {
        let builder = ExecutionIndexBuilder::default();
        let root = ExecutionIndex::root();

        let first = builder
            .compute_child_index(Some(&root), &site("svcA.rpc1"))
            .unwrap();
        let second = builder
            .compute_child_index(Some(&root), &site("svcA.rpc1"))
            .unwrap();

        assert_eq!(first.segments(), &[IndexSegment::new(site("svcA.rpc1"), 0)]);
        assert_eq!(second.segments(), &[IndexSegment::new(site("svcA.rpc1"), 1)]);
    }

    #[test]
    fn counters_are_scoped_by_parent_and_call_site() {
        let builder = ExecutionIndexBuilder::default();
        let root = ExecutionIndex::root();
        let a0 = builder.compute_child_index(Some(&root), &site("a")).unwrap();
        let b0 = builder.compute_child_index(Some(&root), &site("b")).unwrap();
        let a0_a0 = builder.compute_child_index(Some(&a0), &site("a")).unwrap();

        assert_eq!(a0.leaf().unwrap().occurrence_count, 0);
        assert_eq!(b0.leaf().unwrap().occurrence_count, 0);
        assert_eq!(a0_a0.leaf().unwrap().occurrence_count, 0);
        assert_eq!(a0_a0.depth(), 2);
        assert_eq!(builder.tracked_keys(), 3);
    }

    #[test]
    fn over_deep_parent_consumes_no_occurrence() {
        let builder = ExecutionIndexBuilder::default();
        let deepest = ExecutionIndex::from_segments(vec![
            IndexSegment::new(site("a.B"), 0);
            MAX_INDEX_DEPTH
        ])
        .unwrap();

        for _ in 0..3 {
            let result = builder.compute_child_index(Some(&deepest), &site("svcA.rpc1"));
            assert!(matches!(
                result,
                Err(ApplicationError::Domain(DomainError::IndexTooDeep { .. }))
            ));
        }
        assert_eq!(builder.tracked_keys(), 0);

        let shallower = deepest.parent().unwrap();
        let child = builder
            .compute_child_index(Some(&shallower), &site("svcA.rpc1"))
            .unwrap();
        assert_eq!(child.leaf().unwrap().occurrence_count, 0);
    }

    #[test]
    fn concurrent_siblings_get_distinct_counts() {
        let builder = ExecutionIndexBuilder::default();
        let root = ExecutionIndex::root();
        let call_site = site("svcA.rpc1");
        let (builder, root, call_site) = (&builder, &root, &call_site);

        let counts: Vec<u32> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(move || {
                        (0..100)
                            .map(|_| {
                                builder
                                    .compute_child_index(Some(root), call_site)
                                    .unwrap()
                                    .leaf()
                                    .unwrap()
                                    .occurrence_count
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });

        let distinct: HashSet<u32> = counts.iter().copied().collect();
        assert_eq!(distinct.len(), 800);
        assert_eq!(distinct, (0..800).collect());
    }

    #[test]
    fn two_concurrent_calls_scenario() {
        let builder = ExecutionIndexBuilder::default();
        let root = ExecutionIndex::root();
        let call_site = site("svcA.rpc1");

        let (left, right) = std::thread::scope(|scope| {
            let l = scope.spawn(|| builder.compute_child_index(Some(&root), &call_site).unwrap());
            let r = scope.spawn(|| builder.compute_child_index(Some(&root), &call_site).unwrap());
            (l.join().unwrap(), r.join().unwrap())
        });

        let mut seen = vec![
            left.leaf().unwrap().occurrence_count,
            right.leaf().unwrap().occurrence_count,
        ];
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1]);
        assert_ne!(left, right);
    }

    proptest! {
        #[test]
        fn counts_strictly_increase_in_assignment_order(
            sites in proptest::collection::vec(0usize..4, 1..64)
        ) {
            let builder = ExecutionIndexBuilder::default();
            let root = ExecutionIndex::root();
            let mut last: HashMap<usize, u32> = HashMap::new();

            for s in sites {
                let index = builder
                    .compute_child_index(Some(&root), &site(&format!("site{s}")))
                    .unwrap();
                let count = index.leaf().unwrap().occurrence_count;
                if let Some(previous) = last.get(&s) {
                    prop_assert!(count > *previous);
                } else {
                    prop_assert_eq!(count, 0);
                }
                last.insert(s, count);
            }
        }
    }
}
