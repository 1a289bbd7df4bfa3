//! Lifecycle of one intercepted call

use std::fmt;

use serde::{Deserialize, Serialize};

/// State machine of an intercepted call
///
/// ```text
/// Created -> IndexAssigned -> DecisionPending -> {PassedThrough | Faulted} -> Completed
/// Created -> PassedThrough                       (no context, or bypassed)
/// any non-terminal state -> Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    Created,
    IndexAssigned,
    DecisionPending,
    PassedThrough,
    Faulted,
    Completed,
    Cancelled,
}

impl CallState {
    /// True once the call can no longer change state
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether `self -> next` is a legal transition
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Created, Self::IndexAssigned | Self::PassedThrough)
            | (Self::IndexAssigned, Self::DecisionPending)
            | (Self::DecisionPending, Self::PassedThrough | Self::Faulted)
            | (Self::PassedThrough | Self::Faulted, Self::Completed) => true,
            (current, Self::Cancelled) => !current.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::IndexAssigned => "index_assigned",
            Self::DecisionPending => "decision_pending",
            Self::PassedThrough => "passed_through",
            Self::Faulted => "faulted",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}
