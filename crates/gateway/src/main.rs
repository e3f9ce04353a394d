use anyhow::Context;
use common::{Environment, LogLevel};
use gateway::{AppState, get_configuration, logging, router};
use inference::{Detector, YoloDetector};
use std::sync::Arc;

#[cfg(feature = "ort-backend")]
use inference::backend::ort::OrtBackend as Backend;

#[cfg(not(feature = "ort-backend"))]
compile_error!("The 'ort-backend' feature must be enabled to build the gateway binary");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = match get_configuration() {
        Ok(settings) => settings,
        Err(e) => {
            common::setup_logging(LogLevel::Info, Environment::from_env());
            tracing::error!(error = %e, "Invalid configuration");
            return Err(e).context("failed to load configuration");
        }
    };

    let _telemetry = logging::init(&settings)?;

    tracing::info!(settings = ?settings, "Loaded configuration");

    let detector_config = settings.detector_config();
    tracing::info!(model = %detector_config.model_path.display(), "Loading detector");
    let detector: Arc<dyn Detector> = match YoloDetector::<Backend>::load(&detector_config) {
        Ok(detector) => Arc::new(detector),
        Err(e) => {
            tracing::error!(error = %e, "Detector could not be loaded");
            return Err(e.context("failed to load detector"));
        }
    };
    tracing::info!(input_size = detector.input_size(), "Detector ready");

    let listen_addr = settings.listen_addr;
    let session_ttl = settings.session_ttl();
    let state = AppState::new(detector, settings);
    let _sweeper = state.sessions.spawn_sweeper(session_ttl);

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", listen_addr))?;
    tracing::info!(address = %listen_addr, "Gateway listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
