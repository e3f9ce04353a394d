use common::{Environment, LogLevel};
use inference::{DetectorConfig, ExecutionProvider};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const CONFIG_FILE: &str = "gateway";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub environment: Environment,
    pub log_level: LogLevel,
    pub listen_addr: SocketAddr,
    pub model_path: PathBuf,
    pub assets_dir: PathBuf,
    pub font_path: Option<PathBuf>,
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    pub intra_threads: usize,
    pub execution_provider: ExecutionProvider,
    pub detect_timeout_secs: u64,
    pub max_upload_bytes: usize,
    pub session_ttl_secs: u64,
    pub max_sessions: usize,
    pub otel_endpoint: Option<String>,
}

impl Settings {
    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            model_path: self.model_path.clone(),
            font_path: self.font_path.clone(),
            input_size: self.input_size,
            confidence_threshold: self.confidence_threshold,
            iou_threshold: self.iou_threshold,
            max_detections: self.max_detections,
            intra_threads: self.intra_threads,
            execution_provider: self.execution_provider,
        }
    }

    pub fn detect_timeout(&self) -> Duration {
        Duration::from_secs(self.detect_timeout_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// Create default configuration for testing
    #[cfg(test)]
    pub fn test_default() -> Self {
        Self {
            environment: Environment::Development,
            log_level: LogLevel::Info,
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            model_path: PathBuf::from("/models/best.onnx"),
            assets_dir: PathBuf::from("/nonexistent/assets"),
            font_path: None,
            input_size: 640,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            max_detections: 300,
            intra_threads: 1,
            execution_provider: ExecutionProvider::Cpu,
            detect_timeout_secs: 30,
            max_upload_bytes: 1024 * 1024,
            session_ttl_secs: 1800,
            max_sessions: 16,
            otel_endpoint: None,
        }
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        let invalid = |msg: String| Err(config::ConfigError::Message(msg));

        if self.input_size == 0 {
            return invalid("input_size must be positive".to_string());
        }
        for (name, value) in [
            ("confidence_threshold", self.confidence_threshold),
            ("iou_threshold", self.iou_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return invalid(format!("{} must be within [0, 1], got {}", name, value));
            }
        }
        for (name, value) in [
            ("max_detections", self.max_detections as u64),
            ("intra_threads", self.intra_threads as u64),
            ("detect_timeout_secs", self.detect_timeout_secs),
            ("max_upload_bytes", self.max_upload_bytes as u64),
            ("max_sessions", self.max_sessions as u64),
        ] {
            if value == 0 {
                return invalid(format!("{} must be positive", name));
            }
        }
        Ok(())
    }
}

/// Load settings from defaults, an optional `gateway.toml` and `GATEWAY_*`
/// environment variables, in increasing precedence.
pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let config = config::Config::builder()
        .set_default("environment", "development")?
        .set_default("log_level", "info")?
        .set_default("listen_addr", "0.0.0.0:8501")?
        .set_default("model_path", "best.onnx")?
        .set_default("assets_dir", "assets")?
        .set_default("input_size", 640)?
        .set_default("confidence_threshold", 0.25)?
        .set_default("iou_threshold", 0.45)?
        .set_default("max_detections", 300)?
        .set_default("intra_threads", 4)?
        .set_default("execution_provider", "cpu")?
        .set_default("detect_timeout_secs", 30)?
        .set_default("max_upload_bytes", 200 * 1024 * 1024)?
        .set_default("session_ttl_secs", 30 * 60)?
        .set_default("max_sessions", 1024)?
        .add_source(config::File::with_name(CONFIG_FILE).required(false))
        .add_source(
            config::Environment::with_prefix("GATEWAY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let settings: Settings = config.try_deserialize::<Settings>()?;
    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn with_env<T>(vars: &[(&str, &str)], f: impl FnOnce() -> T) -> T {
        for (key, value) in vars {
            unsafe { std::env::set_var(key, value) };
        }
        let result = f();
        for (key, _) in vars {
            unsafe { std::env::remove_var(key) };
        }
        result
    }

    #[test]
    #[serial]
    fn test_defaults() {
        let settings = get_configuration().unwrap();

        assert_eq!(settings.environment, Environment::Development);
        assert_eq!(settings.log_level, LogLevel::Info);
        assert_eq!(settings.listen_addr, "0.0.0.0:8501".parse().unwrap());
        assert_eq!(settings.model_path, PathBuf::from("best.onnx"));
        assert_eq!(settings.input_size, 640);
        assert_eq!(settings.confidence_threshold, 0.25);
        assert_eq!(settings.iou_threshold, 0.45);
        assert_eq!(settings.execution_provider, ExecutionProvider::Cpu);
        assert_eq!(settings.detect_timeout(), Duration::from_secs(30));
        assert_eq!(settings.max_upload_bytes, 200 * 1024 * 1024);
        assert_eq!(settings.session_ttl(), Duration::from_secs(1800));
        assert_eq!(settings.max_sessions, 1024);
        assert!(settings.font_path.is_none());
        assert!(settings.otel_endpoint.is_none());
    }

    #[test]
    #[serial]
    fn test_environment_overrides() {
        let settings = with_env(
            &[
                ("GATEWAY_ENVIRONMENT", "prod"),
                ("GATEWAY_LOG_LEVEL", "debug"),
                ("GATEWAY_LISTEN_ADDR", "127.0.0.1:9000"),
                ("GATEWAY_CONFIDENCE_THRESHOLD", "0.5"),
                ("GATEWAY_EXECUTION_PROVIDER", "cuda"),
                ("GATEWAY_OTEL_ENDPOINT", "http://localhost:4317"),
            ],
            get_configuration,
        )
        .unwrap();

        assert_eq!(settings.environment, Environment::Production);
        assert_eq!(settings.log_level, LogLevel::Debug);
        assert_eq!(settings.listen_addr.port(), 9000);
        assert_eq!(settings.confidence_threshold, 0.5);
        assert_eq!(settings.execution_provider, ExecutionProvider::Cuda);
        assert_eq!(
            settings.otel_endpoint.as_deref(),
            Some("http://localhost:4317")
        );

        let detector = settings.detector_config();
        assert_eq!(detector.confidence_threshold, 0.5);
        assert_eq!(detector.input_size, 640);
    }

    #[test]
    #[serial]
    fn test_invalid_values_are_rejected() {
        let result = with_env(&[("GATEWAY_IOU_THRESHOLD", "1.5")], get_configuration);
        assert!(result.unwrap_err().to_string().contains("iou_threshold"));

        let result = with_env(&[("GATEWAY_MAX_SESSIONS", "0")], get_configuration);
        assert!(result.unwrap_err().to_string().contains("max_sessions"));

        let result = with_env(&[("GATEWAY_ENVIRONMENT", "staging")], get_configuration);
        assert!(result.is_err());
    }
}
