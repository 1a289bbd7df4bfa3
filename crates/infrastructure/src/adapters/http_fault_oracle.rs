//! HTTP/JSON fault oracle client
//!
//! Talks to a Filibuster server:
//! - `POST {endpoint}/filibuster/decide` for each intercepted call
//! - `POST {endpoint}/filibuster/update` with the observed outcome
//!
//! Every request is marked with `x-filibuster-instrumentation: true` so the
//! instrumented HTTP client never intercepts oracle traffic.

use std::time::Duration;

use application::{
    ApplicationError, FaultOraclePort, INSTRUMENTATION_KEY, OracleQuery, OutcomeReport,
};
use async_trait::async_trait;
use domain::FaultDecision;
use reqwest::{
    Client, Url,
    header::{HeaderMap, HeaderValue},
};
use tracing::{debug, instrument};

use super::{
    circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState},
    oracle_wire::{DecideResponse, UpdateRequest},
};
use crate::config::OracleConfig;

/// Fault oracle reached over HTTP
#[derive(Debug)]
pub struct HttpFaultOracle {
    client: Client,
    decide_url: Url,
    update_url: Url,
    timeout: Duration,
    breaker: CircuitBreaker,
}

impl HttpFaultOracle {
    /// Create a client for the oracle described by `config`
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the endpoint is missing or invalid,
    /// or if the HTTP client cannot be built.
    pub fn new(config: &OracleConfig) -> Result<Self, ApplicationError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| ApplicationError::Configuration("oracle endpoint not set".into()))?;
        let base = endpoint.trim_end_matches('/');
        let parse = |path: &str| {
            Url::parse(&format!("{base}{path}"))
                .map_err(|e| ApplicationError::Configuration(format!("oracle endpoint: {e}")))
        };

        let mut headers = HeaderMap::new();
        headers.insert(INSTRUMENTATION_KEY, HeaderValue::from_static("true"));
        let client = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(concat!("filibuster-instrumentation/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(|e| ApplicationError::Configuration(format!("oracle client: {e}")))?;

        Ok(Self {
            client,
            decide_url: parse("/filibuster/decide")?,
            update_url: parse("/filibuster/update")?,
            timeout: config.timeout(),
            breaker: CircuitBreaker::with_config(
                "fault-oracle",
                CircuitBreakerConfig::new(config.failure_threshold, 1, config.cooldown()),
            ),
        })
    }

    /// Current state of the oracle circuit
    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    fn map_transport(&self, e: &reqwest::Error) -> ApplicationError {
        if e.is_timeout() {
            ApplicationError::OracleTimeout(self.timeout)
        } else {
            ApplicationError::OracleUnreachable(e.to_string())
        }
    }

    async fn post_decide(&self, query: &OracleQuery) -> Result<FaultDecision, ApplicationError> {
        let response = self
            .client
            .post(self.decide_url.clone())
            .json(query)
            .send()
            .await
            .map_err(|e| self.map_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApplicationError::OracleUnreachable(format!(
                "decide returned {status}"
            )));
        }

        let body = response.bytes().await.map_err(|e| self.map_transport(&e))?;
        serde_json::from_slice::<DecideResponse>(&body)
            .map_err(|e| ApplicationError::OracleProtocol(e.to_string()))?
            .into_decision()
    }
}

#[async_trait]
impl FaultOraclePort for HttpFaultOracle {
    #[instrument(skip_all, fields(execution_index = %query.execution_index, session_id = %query.session_id))]
    async fn decide(&self, query: &OracleQuery) -> Result<FaultDecision, ApplicationError> {
        let decision = self
            .breaker
            .call(|| self.post_decide(query))
            .await
            .map_err(|e| match e {
                CircuitBreakerError::CircuitOpen(name) => {
                    ApplicationError::OracleUnreachable(format!("circuit '{name}' open"))
                },
                CircuitBreakerError::ServiceError(e) => e,
            })?;
        debug!(decision = decision.label(), "Oracle decided");
        Ok(decision)
    }

    async fn report_outcome(&self, report: &OutcomeReport) -> Result<(), ApplicationError> {
        if self.breaker.is_open() {
            return Err(ApplicationError::OracleUnreachable(
                "circuit open, report dropped".into(),
            ));
        }
        let response = self
            .client
            .post(self.update_url.clone())
            .json(&UpdateRequest::from_report(report))
            .send()
            .await
            .map_err(|e| self.map_transport(&e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ApplicationError::OracleUnreachable(format!(
                "update returned {}",
                response.status()
            )))
        }
    }
}
