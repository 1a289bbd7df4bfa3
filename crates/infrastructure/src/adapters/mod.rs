//! Infrastructure adapters
//!
//! Adapters connect application ports to concrete implementations.

mod circuit_breaker;
mod http_fault_oracle;
mod oracle_wire;
mod scripted_fault_oracle;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};
pub use http_fault_oracle::HttpFaultOracle;
pub use scripted_fault_oracle::{FaultRule, ScriptedFaultOracle};
