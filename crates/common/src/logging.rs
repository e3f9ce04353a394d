use crate::config::{Environment, LogLevel};
use tracing::Subscriber;
use tracing_subscriber::{
    EnvFilter, Layer, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt,
};

/// Build the filter from `RUST_LOG`, falling back to the configured level.
pub fn env_filter(default_level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level.as_str()))
}

/// Pretty, colored output for development and JSON lines for production.
pub fn fmt_layer<S>(environment: Environment) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    match environment {
        Environment::Production => tracing_subscriber::fmt::layer()
            .json()
            .with_level(true)
            .boxed(),
        Environment::Development => tracing_subscriber::fmt::layer()
            .pretty()
            .with_ansi(true)
            .boxed(),
    }
}

/// Initialize the global tracing subscriber without telemetry export.
///
/// Use [`crate::TelemetryGuard::init`] instead when an OTLP collector is configured;
/// it installs the same formatting plus the OpenTelemetry bridge.
pub fn setup_logging(default_level: LogLevel, environment: Environment) {
    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(fmt_layer(environment))
        .init();
}
