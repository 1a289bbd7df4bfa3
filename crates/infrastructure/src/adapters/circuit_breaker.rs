//! Circuit breaker for oracle calls
//!
//! Once the oracle has failed `failure_threshold` times in a row, further
//! calls fail fast for the cooldown period instead of each waiting out the
//! full timeout. One trial call is then allowed through.
//!
//! # States
//!
//! - **Closed**: Normal operation, requests pass through
//! - **Open**: Oracle is down, requests fail fast without calling it
//! - **Half-Open**: Testing if the oracle has recovered

use std::{
    fmt,
    time::{Duration, Instant},
};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

/// Configuration for a circuit breaker
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Number of consecutive successes in half-open state to close the circuit
    pub success_threshold: u32,
    /// Time to wait before transitioning from Open to Half-Open
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 1,
            cooldown: Duration::from_secs(10),
        }
    }
}

impl CircuitBreakerConfig {
    /// Creates a custom configuration
    #[must_use]
    pub const fn new(failure_threshold: u32, success_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            success_threshold,
            cooldown,
        }
    }
}

/// State of a circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Internal state tracking
#[derive(Debug)]
struct CircuitBreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    opened_at: Option<Instant>,
}

impl CircuitBreakerState {
    const fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            opened_at: None,
        }
    }

    fn open(&mut self) {
        self.state = CircuitState::Open;
        self.opened_at = Some(Instant::now());
        self.failure_count = 0;
        self.success_count = 0;
    }
}

/// Error returned by [`CircuitBreaker::call`]
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// The circuit is open, the operation was not attempted
    #[error("Circuit breaker open for '{0}'")]
    CircuitOpen(String),
    /// The operation ran and failed
    #[error(transparent)]
    ServiceError(E),
}

impl<E> CircuitBreakerError<E> {
    /// Returns true if this is a circuit open error
    #[must_use]
    pub const fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen(_))
    }
}

/// Circuit breaker wrapper for async calls
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: RwLock<CircuitBreakerState>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    /// Creates a new circuit breaker with default configuration
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, CircuitBreakerConfig::default())
    }

    /// Creates a new circuit breaker with custom configuration
    #[must_use]
    pub fn with_config(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: RwLock::new(CircuitBreakerState::closed()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current state, moving Open to Half-Open once the cooldown elapsed
    #[must_use]
    pub fn state(&self) -> CircuitState {
        let mut state = self.state.write();
        if state.state == CircuitState::Open
            && state
                .opened_at
                .is_some_and(|opened_at| opened_at.elapsed() >= self.config.cooldown)
        {
            debug!(circuit = %self.name, "Circuit transitioning from Open to HalfOpen");
            state.state = CircuitState::HalfOpen;
            state.success_count = 0;
        }
        state.state
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    fn on_success(&self) {
        let mut state = self.state.write();
        state.failure_count = 0;
        if state.state == CircuitState::HalfOpen {
            state.success_count += 1;
            if state.success_count >= self.config.success_threshold {
                info!(circuit = %self.name, "Circuit transitioning from HalfOpen to Closed");
                *state = CircuitBreakerState::closed();
            }
        }
    }

    fn on_failure(&self) {
        let mut state = self.state.write();
        state.failure_count += 1;
        state.success_count = 0;
        match state.state {
            CircuitState::Closed if state.failure_count >= self.config.failure_threshold => {
                warn!(
                    circuit = %self.name,
                    failures = state.failure_count,
                    "Circuit transitioning from Closed to Open"
                );
                state.open();
            },
            CircuitState::HalfOpen => {
                warn!(circuit = %self.name, "Circuit transitioning from HalfOpen to Open after failure");
                state.open();
            },
            CircuitState::Closed | CircuitState::Open => {},
        }
    }

    /// Run `f` through the breaker
    ///
    /// # Errors
    ///
    /// Returns `CircuitOpen` without running `f` while the circuit is open,
    /// otherwise the error of `f`.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        if self.state() == CircuitState::Open {
            return Err(CircuitBreakerError::CircuitOpen(self.name.clone()));
        }

        match f().await {
            Ok(result) => {
                self.on_success();
                Ok(result)
            },
            Err(e) => {
                self.on_failure();
                Err(CircuitBreakerError::ServiceError(e))
            },
        }
    }
}
