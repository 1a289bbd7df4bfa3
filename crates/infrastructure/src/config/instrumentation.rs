//! Instrumentation and session configuration

use std::time::Duration;

use application::{DEFAULT_MAX_CALL_LOG, SessionLimits};
use serde::{Deserialize, Serialize};

use super::default_true;

/// Process-wide instrumentation switches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentationConfig {
    /// Name of the local service, as reported to the oracle
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Intercept calls at all (`DISABLE_INSTRUMENTATION` turns this off)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Talk to the oracle (`DISABLE_SERVER_COMMUNICATION` turns this off)
    ///
    /// When off, calls still get execution indices and propagated metadata
    /// but every decision is a pass-through.
    #[serde(default = "default_true")]
    pub server_communication: bool,
}

fn default_service_name() -> String {
    "unknown-service".to_string()
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            enabled: true,
            server_communication: true,
        }
    }
}

/// Session defaults and memory bounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session used for traffic that carries no session id and arrives
    /// before any harness has started one
    #[serde(default)]
    pub default_id: Option<String>,

    /// Call records kept per session; older records are dropped
    #[serde(default = "default_max_call_log")]
    pub max_call_log: usize,

    /// Idle seconds before a session that no harness started is evicted
    #[serde(default = "default_idle_ttl_secs")]
    pub idle_ttl_secs: u64,

    /// Sessions without a harness kept at once
    #[serde(default = "default_max_implicit_sessions")]
    pub max_implicit_sessions: u64,
}

const fn default_max_call_log() -> usize {
    DEFAULT_MAX_CALL_LOG
}

const fn default_idle_ttl_secs() -> u64 {
    1800
}

const fn default_max_implicit_sessions() -> u64 {
    10_000
}

impl SessionConfig {
    /// Registry limits for these settings
    #[must_use]
    pub const fn limits(&self) -> SessionLimits {
        SessionLimits {
            max_call_log: self.max_call_log,
            idle_ttl: Duration::from_secs(self.idle_ttl_secs),
            max_implicit_sessions: self.max_implicit_sessions,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_id: None,
            max_call_log: default_max_call_log(),
            idle_ttl_secs: default_idle_ttl_secs(),
            max_implicit_sessions: default_max_implicit_sessions(),
        }
    }
}
