//! Tracing subscriber and OpenTelemetry export
//!
//! Installs console logging through `tracing-subscriber` and, when enabled,
//! an OTLP span exporter. If the collector cannot be set up the process
//! keeps running with console logging only.

use std::time::Duration;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource,
    trace::{Sampler, SdkTracerProvider},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Configuration for logging and trace export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Whether OpenTelemetry export is enabled
    #[serde(default)]
    pub enabled: bool,

    /// OTLP endpoint URL (e.g., "http://localhost:4317" for gRPC)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Sampling ratio (0.0 - 1.0)
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,

    /// Export timeout in seconds
    #[serde(default = "default_export_timeout")]
    pub export_timeout_secs: u64,

    /// Log level filter, overridden by `RUST_LOG`
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Emit console logs as JSON lines
    #[serde(default)]
    pub json_logs: bool,

    /// Continue with console-only logging if the exporter cannot be built
    #[serde(default = "default_graceful_fallback")]
    pub graceful_fallback: bool,
}

const fn default_sampling_ratio() -> f64 {
    1.0
}

const fn default_export_timeout() -> u64 {
    10
}

fn default_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_log_filter() -> String {
    "info,application=info,interceptors=info".to_string()
}

const fn default_graceful_fallback() -> bool {
    true
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_endpoint(),
            sampling_ratio: default_sampling_ratio(),
            export_timeout_secs: default_export_timeout(),
            log_filter: default_log_filter(),
            json_logs: false,
            graceful_fallback: default_graceful_fallback(),
        }
    }
}

/// Guard that flushes and shuts down the tracer provider when dropped
pub struct TelemetryGuard {
    provider: Option<SdkTracerProvider>,
}

impl std::fmt::Debug for TelemetryGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryGuard")
            .field("active", &self.provider.is_some())
            .finish_non_exhaustive()
    }
}

impl TelemetryGuard {
    /// True if spans are being exported
    #[must_use]
    pub const fn is_exporting(&self) -> bool {
        self.provider.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            if let Err(e) = provider.shutdown() {
                tracing::error!("Failed to shutdown tracer provider: {:?}", e);
            }
        }
    }
}

/// Error type for telemetry initialization
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to initialize tracing subscriber
    #[error("Failed to initialize tracing: {0}")]
    Init(String),

    /// Failed to create OTLP exporter
    #[error("Failed to create OTLP exporter: {0}")]
    Exporter(String),
}

fn sampler(ratio: f64) -> Sampler {
    if (ratio - 1.0).abs() < f64::EPSILON {
        Sampler::AlwaysOn
    } else if ratio <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::TraceIdRatioBased(ratio)
    }
}

fn fmt_layer<S>(json: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .boxed()
    }
}

/// Initialize logging and, if enabled, OTLP trace export
///
/// Keep the returned guard alive for the lifetime of the process; dropping
/// it flushes pending spans.
///
/// # Errors
///
/// Fails if a global subscriber is already installed, or if the exporter
/// cannot be built and `graceful_fallback` is off.
pub fn init_telemetry(
    config: &TelemetryConfig,
    service_name: &str,
) -> Result<TelemetryGuard, TelemetryError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));

    if !config.enabled {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer(config.json_logs))
            .try_init()
            .map_err(|e| TelemetryError::Init(e.to_string()))?;

        info!("Telemetry initialized (OTLP disabled, console only)");
        return Ok(TelemetryGuard { provider: None });
    }

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&config.endpoint)
        .with_timeout(Duration::from_secs(config.export_timeout_secs))
        .build();

    match exporter {
        Ok(exporter) => {
            let provider = SdkTracerProvider::builder()
                .with_batch_exporter(exporter)
                .with_sampler(sampler(config.sampling_ratio))
                .with_resource(
                    Resource::builder()
                        .with_service_name(service_name.to_string())
                        .build(),
                )
                .build();
            let tracer = provider.tracer(service_name.to_string());

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer(config.json_logs))
                .with(tracing_opentelemetry::layer().with_tracer(tracer))
                .try_init()
                .map_err(|e| TelemetryError::Init(e.to_string()))?;

            info!(
                endpoint = %config.endpoint,
                service = %service_name,
                sampling = %config.sampling_ratio,
                "Telemetry initialized with OTLP export"
            );
            Ok(TelemetryGuard {
                provider: Some(provider),
            })
        },
        Err(e) if config.graceful_fallback => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer(config.json_logs))
                .try_init()
                .map_err(|e| TelemetryError::Init(e.to_string()))?;

            warn!(
                endpoint = %config.endpoint,
                error = %e,
                "OTLP exporter unavailable, falling back to console-only logging"
            );
            Ok(TelemetryGuard { provider: None })
        },
        Err(e) => Err(TelemetryError::Exporter(e.to_string())),
    }
}
