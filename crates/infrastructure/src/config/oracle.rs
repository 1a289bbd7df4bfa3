//! Fault oracle client configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::default_true;

/// Where the oracle lives and how hard to try reaching it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Base URL of the oracle, e.g. `http://filibuster:5005`
    ///
    /// Without an endpoint every call passes through.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Bound on one decide round trip in milliseconds (default: 2000)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// TCP connect timeout in milliseconds (default: 500)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Send outcome reports after each call
    #[serde(default = "default_true")]
    pub report_outcomes: bool,

    /// Consecutive oracle failures before calls stop trying (default: 5)
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds to wait before probing a failed oracle again (default: 10)
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

const fn default_timeout_ms() -> u64 {
    2_000
}

const fn default_connect_timeout_ms() -> u64 {
    500
}

const fn default_failure_threshold() -> u32 {
    5
}

const fn default_cooldown_secs() -> u64 {
    10
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: default_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            report_outcomes: true,
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl OracleConfig {
    /// Create a configuration pointing at `endpoint`
    #[must_use]
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}
