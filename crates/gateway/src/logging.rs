use crate::config::Settings;
use common::TelemetryGuard;

const SERVICE_NAME: &str = "detector-gateway";

/// Install the global subscriber. With an OTLP endpoint configured the
/// returned guard must be kept alive for the lifetime of the process.
pub fn init(settings: &Settings) -> anyhow::Result<Option<TelemetryGuard>> {
    match &settings.otel_endpoint {
        Some(endpoint) => TelemetryGuard::init(
            SERVICE_NAME,
            endpoint,
            settings.log_level,
            settings.environment,
        )
        .map(Some),
        None => {
            common::setup_logging(settings.log_level, settings.environment);
            Ok(None)
        }
    }
}
