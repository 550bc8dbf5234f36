//! Logging and distributed tracing setup.
//!
//! One `tracing-subscriber` registry with:
//! - an `EnvFilter` (`RUST_LOG` wins over the configured level)
//! - a pretty or JSON fmt layer
//! - an optional OpenTelemetry layer

use gateway_config::{LogFormat, LoggingSection, OtelConfig};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::{
    trace::{Config, RandomIdGenerator, Sampler, TracerProvider},
    Resource,
};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Keeps the tracer provider alive; flushes spans on drop
#[derive(Debug, Default)]
pub struct TelemetryGuard {
    provider: Option<TracerProvider>,
}

impl TelemetryGuard {
    /// Whether spans are exported
    #[must_use]
    pub fn is_exporting(&self) -> bool {
        self.provider.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if self.provider.take().is_some() {
            opentelemetry::global::shutdown_tracer_provider();
        }
    }
}

/// Install the global subscriber
///
/// # Errors
/// Returns error if a global subscriber is already installed or the level is invalid
pub fn init_logging(config: &LoggingSection) -> Result<TelemetryGuard, TelemetryError> {
    let filter = build_filter(&config.level)?;

    let fmt_layer = match config.format {
        LogFormat::Pretty => fmt::layer().with_target(true).boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
    };

    let provider = config.otel.enabled.then(|| tracer_provider(&config.otel));
    let otel_layer = provider.as_ref().map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer(config.otel.service_name.clone()))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()
        .map_err(|e| TelemetryError::Init(e.to_string()))?;

    if let Some(provider) = &provider {
        opentelemetry::global::set_tracer_provider(provider.clone());
    }

    info!(
        level = %config.level,
        format = ?config.format,
        otel = config.otel.enabled,
        "Logging initialized"
    );
    Ok(TelemetryGuard { provider })
}

/// `RUST_LOG` when set, otherwise `level`
///
/// # Errors
/// Returns error if `level` is not a valid filter directive
pub fn build_filter(level: &str) -> Result<EnvFilter, TelemetryError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level).map_err(|e| TelemetryError::Filter(e.to_string())),
    }
}

fn tracer_provider(config: &OtelConfig) -> TracerProvider {
    let resource = Resource::new(vec![
        opentelemetry::KeyValue::new("service.name", config.service_name.clone()),
        opentelemetry::KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
    ]);

    TracerProvider::builder()
        .with_config(
            Config::default()
                .with_sampler(sampler(config.sampling_ratio))
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(resource),
        )
        .build()
}

fn sampler(ratio: f64) -> Sampler {
    if ratio >= 1.0 {
        Sampler::AlwaysOn
    } else if ratio <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(ratio)))
    }
}

/// Telemetry initialization error
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to install the subscriber
    #[error("Failed to initialize logging: {0}")]
    Init(String),
    /// Invalid level directive
    #[error("Invalid log filter: {0}")]
    Filter(String),
}

/// Span covering one caller request
#[macro_export]
macro_rules! request_span {
    ($request_id:expr, $path:expr) => {
        tracing::info_span!(
            "gateway_request",
            request_id = %$request_id,
            path = %$path,
            otel.kind = "server"
        )
    };
}
