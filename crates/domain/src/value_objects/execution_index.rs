//! Execution index value object
//!
//! An execution index is the path from a test's root request down to one
//! specific call: each segment names the call site and how many times that
//! call site had already been invoked under the same parent.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::CallSiteId;
use crate::errors::DomainError;

/// Maximum number of segments in an execution index
pub const MAX_INDEX_DEPTH: usize = 256;

/// One hop of an execution index
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSegment {
    /// Where the call was issued from
    pub call_site_id: CallSiteId,
    /// Zero-based occurrence of this call site under the parent index
    pub occurrence_count: u32,
}

impl IndexSegment {
    /// Create a new segment
    pub const fn new(call_site_id: CallSiteId, occurrence_count: u32) -> Self {
        Self {
            call_site_id,
            occurrence_count,
        }
    }
}

/// Hierarchical identifier of a call's position in the distributed call graph
///
/// Values are immutable: [`ExecutionIndex::child`] returns a new index and
/// leaves the parent untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Vec<IndexSegment>", into = "Vec<IndexSegment>")]
pub struct ExecutionIndex(Vec<IndexSegment>);

impl ExecutionIndex {
    /// The root index `[]`
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    /// Build an index from segments, enforcing the depth limit
    pub fn from_segments(segments: Vec<IndexSegment>) -> Result<Self, DomainError> {
        if segments.len() > MAX_INDEX_DEPTH {
            return Err(DomainError::IndexTooDeep {
                depth: segments.len(),
                max: MAX_INDEX_DEPTH,
            });
        }
        Ok(Self(segments))
    }

    /// Return a new index with one segment appended
    pub fn child(&self, call_site_id: CallSiteId, occurrence_count: u32) -> Result<Self, DomainError> {
        let depth = self.0.len() + 1;
        if depth > MAX_INDEX_DEPTH {
            return Err(DomainError::IndexTooDeep {
                depth,
                max: MAX_INDEX_DEPTH,
            });
        }
        let mut segments = Vec::with_capacity(depth);
        segments.extend_from_slice(&self.0);
        segments.push(IndexSegment::new(call_site_id, occurrence_count));
        Ok(Self(segments))
    }

    /// Segments from root to leaf
    pub fn segments(&self) -> &[IndexSegment] {
        &self.0
    }

    /// Number of segments
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// True for the root index
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// The last segment, if any
    pub fn leaf(&self) -> Option<&IndexSegment> {
        self.0.last()
    }

    /// The index this one was derived from
    pub fn parent(&self) -> Option<Self> {
        self.0
            .split_last()
            .map(|(_, rest)| Self(rest.to_vec()))
    }

    /// True if `self` is a (non-strict) prefix of `other`
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        other.0.starts_with(&self.0)
    }
}

impl fmt::Display for ExecutionIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}#{}", segment.call_site_id, segment.occurrence_count)?;
        }
        f.write_str("]")
    }
}

impl TryFrom<Vec<IndexSegment>> for ExecutionIndex {
    type Error = DomainError;

    fn try_from(segments: Vec<IndexSegment>) -> Result<Self, Self::Error> {
        Self::from_segments(segments)
    }
}

impl From<ExecutionIndex> for Vec<IndexSegment> {
    fn from(index: ExecutionIndex) -> Self {
        index.0
    }
}
