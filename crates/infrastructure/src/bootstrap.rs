//! Wiring of the instrumentation from configuration

use std::sync::Arc;

use application::{
    CallInterceptor, FaultDecisionService, FaultOraclePort, InterceptorSettings, SessionRegistry,
};
use tracing::info;

use crate::{
    adapters::HttpFaultOracle,
    config::{AppConfig, ConfigError},
};

/// Everything an adapter needs, built once per process
#[derive(Debug, Clone)]
pub struct Instrumentation {
    config: Arc<AppConfig>,
    interceptor: CallInterceptor,
}

impl Instrumentation {
    /// Build from configuration, talking to the configured HTTP oracle
    ///
    /// # Errors
    ///
    /// Fails if the configuration does not validate or the oracle client
    /// cannot be built.
    pub fn from_config(config: AppConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let oracle: Option<Arc<dyn FaultOraclePort>> = if config.oracle_enabled() {
            let oracle = HttpFaultOracle::new(&config.oracle).map_err(|e| ConfigError::Invalid {
                field: "oracle.endpoint",
                reason: e.to_string(),
            })?;
            Some(Arc::new(oracle))
        } else {
            None
        };
        Self::assemble(config, oracle)
    }

    /// Build from configuration with a caller-supplied oracle
    ///
    /// The oracle is still skipped when instrumentation or server
    /// communication is disabled.
    ///
    /// # Errors
    ///
    /// Fails if the configuration does not validate.
    pub fn with_oracle(config: AppConfig, oracle: Arc<dyn FaultOraclePort>) -> Result<Self, ConfigError> {
        config.validate()?;
        let oracle = (config.instrumentation.enabled && config.instrumentation.server_communication)
            .then_some(oracle);
        Self::assemble(config, oracle)
    }

    fn assemble(
        config: AppConfig,
        oracle: Option<Arc<dyn FaultOraclePort>>,
    ) -> Result<Self, ConfigError> {
        let registry = Arc::new(SessionRegistry::with_limits(
            config.default_session_id()?,
            config.session.limits(),
        ));
        let decisions = match oracle {
            Some(oracle) => FaultDecisionService::new(oracle, config.oracle.timeout())
                .with_outcome_reports(config.oracle.report_outcomes)
                .with_source_service(config.instrumentation.service_name.clone()),
            None => FaultDecisionService::offline(),
        };
        let settings = InterceptorSettings {
            service_name: config.instrumentation.service_name.clone(),
            enabled: config.instrumentation.enabled,
        };

        info!(
            service = %settings.service_name,
            enabled = settings.enabled,
            oracle = decisions.has_oracle(),
            "Instrumentation ready"
        );

        Ok(Self {
            config: Arc::new(config),
            interceptor: CallInterceptor::new(registry, decisions, settings),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Interceptor shared by every adapter of this process
    pub const fn interceptor(&self) -> &CallInterceptor {
        &self.interceptor
    }

    pub const fn registry(&self) -> &Arc<SessionRegistry> {
        self.interceptor.registry()
    }
}
