use serde::Deserialize;
use std::env;
use std::fmt;

/// Deployment environment. Selects the log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }

    /// Read `ENVIRONMENT`, falling back to development for unset or unknown values.
    pub fn from_env() -> Self {
        env::var("ENVIRONMENT")
            .ok()
            .and_then(|value| Environment::try_from(value).ok())
            .unwrap_or(Environment::Development)
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `development` or `production`.",
                other
            )),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_environment_try_from_accepts_aliases() {
        assert_eq!(
            Environment::try_from("PROD".to_string()),
            Ok(Environment::Production)
        );
        assert_eq!(
            Environment::try_from("dev".to_string()),
            Ok(Environment::Development)
        );
        assert!(Environment::try_from("staging".to_string()).is_err());
    }

    #[test]
    #[serial]
    fn test_environment_from_env_defaults_to_development() {
        unsafe { env::remove_var("ENVIRONMENT") };
        assert_eq!(Environment::from_env(), Environment::Development);

        unsafe { env::set_var("ENVIRONMENT", "nonsense") };
        assert_eq!(Environment::from_env(), Environment::Development);

        unsafe { env::remove_var("ENVIRONMENT") };
    }

    #[test]
    #[serial]
    fn test_environment_from_env_production() {
        unsafe { env::set_var("ENVIRONMENT", "production") };
        assert_eq!(Environment::from_env(), Environment::Production);
        unsafe { env::remove_var("ENVIRONMENT") };
    }

    #[test]
    fn test_deserialize_log_level_and_environment() {
        #[derive(Deserialize)]
        struct Parsed {
            log_level: LogLevel,
            environment: Environment,
        }

        let parsed: Parsed =
            serde_json::from_str(r#"{"log_level":"debug","environment":"Production"}"#).unwrap();
        assert_eq!(parsed.log_level, LogLevel::Debug);
        assert_eq!(parsed.environment, Environment::Production);
        assert_eq!(parsed.log_level.as_str(), "debug");
    }
}
