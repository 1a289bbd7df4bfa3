//! Domain layer for Filibuster RPC instrumentation
//!
//! Defines the vocabulary shared by every layer: execution indices, call
//! sites and signatures, session ids, fault decisions and the lifecycle of an
//! intercepted call. This layer performs no I/O.

pub mod entities;
pub mod errors;
pub mod value_objects;

pub use entities::*;
pub use errors::DomainError;
pub use value_objects::*;
