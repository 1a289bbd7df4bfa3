//! Port definitions for application layer
//!
//! Ports are interfaces that define how the application interacts with
//! external systems. Adapters in the infrastructure layer implement these ports.

mod fault_oracle_port;
mod occurrence_counter;

#[cfg(test)]
pub use fault_oracle_port::MockFaultOraclePort;
pub use fault_oracle_port::{CallResult, FaultOraclePort, OracleQuery, OutcomeReport};
pub use occurrence_counter::OccurrenceCounter;
