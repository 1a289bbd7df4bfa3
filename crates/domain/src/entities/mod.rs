//! Domain entities

mod call_state;
mod fault_decision;

pub use call_state::CallState;
pub use fault_decision::{FaultDecision, InjectedFault};
