//! Instrumentation configuration
//!
//! Split into focused sub-modules:
//! - `instrumentation`: service name and global switches, session defaults
//! - `oracle`: fault oracle endpoint, timeouts and circuit breaker settings
//!
//! Sources, lowest precedence first: built-in defaults, an optional
//! `filibuster.toml`, `FILIBUSTER__SECTION__KEY` environment variables, and
//! finally the bare `SERVICE_NAME`, `DISABLE_INSTRUMENTATION` and
//! `DISABLE_SERVER_COMMUNICATION` variables.

mod instrumentation;
mod oracle;

use std::path::Path;

use domain::SessionId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub use instrumentation::{InstrumentationConfig, SessionConfig};
pub use oracle::OracleConfig;

use crate::telemetry::TelemetryConfig;

/// Shared default for boolean `true` fields across config structs
pub(crate) const fn default_true() -> bool {
    true
}

/// Default configuration file name, resolved relative to the working directory
pub const CONFIG_FILE_NAME: &str = "filibuster";
/// Prefix of structured environment overrides
pub const ENV_PREFIX: &str = "FILIBUSTER";

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read or deserialized
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A value is present but unusable
    #[error("Invalid configuration value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub instrumentation: InstrumentationConfig,

    #[serde(default)]
    pub oracle: OracleConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Load from `filibuster.toml` (if present) and the process environment
    ///
    /// # Errors
    ///
    /// Fails if a source is unreadable or the result does not validate.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load from an explicit file (which must exist) or the default file
    ///
    /// # Errors
    ///
    /// Fails if a source is unreadable or the result does not validate.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(CONFIG_FILE_NAME).required(false),
        };

        let mut config: Self = config::Config::builder()
            .add_source(file)
            // e.g. FILIBUSTER__ORACLE__ENDPOINT
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        debug!(
            service = %config.instrumentation.service_name,
            enabled = config.instrumentation.enabled,
            oracle = ?config.oracle.endpoint,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Apply the bare environment overrides through `lookup`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(name) = lookup("SERVICE_NAME").filter(|n| !n.trim().is_empty()) {
            self.instrumentation.service_name = name.trim().to_string();
        }
        if lookup("DISABLE_INSTRUMENTATION").is_some_and(|v| is_truthy(&v)) {
            self.instrumentation.enabled = false;
        }
        if lookup("DISABLE_SERVER_COMMUNICATION").is_some_and(|v| is_truthy(&v)) {
            self.instrumentation.server_communication = false;
        }
    }

    /// Check every value that would otherwise fail later at runtime
    ///
    /// # Errors
    ///
    /// Returns the first invalid value found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instrumentation.service_name.trim().is_empty() {
            return Err(ConfigError::invalid(
                "instrumentation.service_name",
                "must not be empty",
            ));
        }

        if let Some(endpoint) = &self.oracle.endpoint {
            let url = reqwest::Url::parse(endpoint)
                .map_err(|e| ConfigError::invalid("oracle.endpoint", format!("{endpoint}: {e}")))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ConfigError::invalid(
                    "oracle.endpoint",
                    format!("unsupported scheme '{}'", url.scheme()),
                ));
            }
        }
        if self.oracle.timeout_ms == 0 {
            return Err(ConfigError::invalid("oracle.timeout_ms", "must be positive"));
        }
        if self.oracle.connect_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "oracle.connect_timeout_ms",
                "must be positive",
            ));
        }
        if self.oracle.failure_threshold == 0 {
            return Err(ConfigError::invalid(
                "oracle.failure_threshold",
                "must be positive",
            ));
        }

        self.default_session_id()?;
        if self.session.max_call_log == 0 {
            return Err(ConfigError::invalid("session.max_call_log", "must be positive"));
        }
        if self.session.idle_ttl_secs == 0 {
            return Err(ConfigError::invalid("session.idle_ttl_secs", "must be positive"));
        }
        if self.session.max_implicit_sessions == 0 {
            return Err(ConfigError::invalid(
                "session.max_implicit_sessions",
                "must be positive",
            ));
        }

        if !(0.0..=1.0).contains(&self.telemetry.sampling_ratio) {
            return Err(ConfigError::invalid(
                "telemetry.sampling_ratio",
                format!("{} not in 0.0..=1.0", self.telemetry.sampling_ratio),
            ));
        }
        Ok(())
    }

    /// The configured default session, parsed
    ///
    /// # Errors
    ///
    /// Fails if the configured id is not a valid session id.
    pub fn default_session_id(&self) -> Result<Option<SessionId>, ConfigError> {
        self.session
            .default_id
            .as_deref()
            .map(SessionId::parse)
            .transpose()
            .map_err(|e| ConfigError::invalid("session.default_id", e.to_string()))
    }

    /// True if decisions should be requested from an oracle
    #[must_use]
    pub const fn oracle_enabled(&self) -> bool {
        self.instrumentation.enabled
            && self.instrumentation.server_communication
            && self.oracle.endpoint.is_some()
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
