//! Application layer - Interception use cases and orchestration
//!
//! Contains the framework-independent half of the instrumentation: execution
//! index assignment, context propagation, fault decisions and session state,
//! plus the ports the infrastructure layer implements.

pub mod call_context;
pub mod error;
pub mod ports;
pub mod services;

pub use call_context::{ExecutionContext, in_current_context};
pub use error::ApplicationError;
pub use ports::*;
pub use services::*;
