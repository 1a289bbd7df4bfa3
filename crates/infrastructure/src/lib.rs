//! Infrastructure layer - Adapters for external systems
//!
//! Implements the fault oracle port over HTTP and offline, loads
//! configuration, sets up telemetry and wires everything into an
//! [`Instrumentation`] handle.

pub mod adapters;
pub mod bootstrap;
pub mod config;
pub mod telemetry;

pub use adapters::*;
pub use bootstrap::Instrumentation;
pub use config::{
    AppConfig, ConfigError, InstrumentationConfig, OracleConfig, SessionConfig,
};
pub use telemetry::{TelemetryConfig, TelemetryError, TelemetryGuard, init_telemetry};
