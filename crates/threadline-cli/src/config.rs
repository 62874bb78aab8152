use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use threadline_types::{ConnectionConfig, SessionConfig};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,

    // Secrets (from ENV only)
    #[serde(default, skip_deserializing)]
    pub email: String,
    #[serde(default, skip_deserializing)]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_ms: 30_000,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from TOML files and environment variables
    ///
    /// Hierarchy (weakest to strongest):
    /// 1. {dir}/default.toml
    /// 2. {dir}/{ENV}.toml (if ENV is set)
    /// 3. Environment variables prefixed with THREADLINE_, sections split by
    ///    a double underscore (e.g. THREADLINE_CONNECTION__WS_URL)
    ///
    /// `dir` is `THREADLINE_CONFIG_DIR`, or `config` relative to the working directory.
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("ENV").unwrap_or_else(|_| "dev".to_string());
        let dir = std::env::var("THREADLINE_CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        let builder = ConfigLoader::builder()
            // 1. Load default config
            .add_source(File::with_name(&format!("{}/default", dir)).required(false))
            // 2. Load environment-specific config
            .add_source(File::with_name(&format!("{}/{}", dir, env)).required(false))
            // 3. Environment variables override everything
            .add_source(
                Environment::with_prefix("THREADLINE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;

        let mut cfg: Config = config.try_deserialize()?;

        // Load secrets from ENV (not in TOML)
        cfg.email = std::env::var("THREADLINE_EMAIL").map_err(|_| {
            ConfigError::Message("THREADLINE_EMAIL environment variable is required".to_string())
        })?;
        cfg.password = std::env::var("THREADLINE_PASSWORD").map_err(|_| {
            ConfigError::Message("THREADLINE_PASSWORD environment variable is required".to_string())
        })?;

        Ok(cfg)
    }

    /// Load config from a specific path (useful for testing)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let builder = ConfigLoader::builder().add_source(File::from(path.as_ref()));

        let config = builder.build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_structure() {
        let toml = r#"
            [api]
            base_url = "https://chat.example.com"
            timeout_ms = 5000

            [connection]
            ws_url = "wss://chat.example.com"
            max_attempts = 5

            [session]
            send_timeout_ms = 2000

            [logging]
            level = "debug"
            format = "json"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.api.timeout(), Duration::from_secs(5));
        assert_eq!(config.connection.ws_url, "wss://chat.example.com");
        assert_eq!(config.connection.max_attempts, 5);
        // Unset fields keep their defaults
        assert_eq!(config.connection.backoff_base_ms, 1_000);
        assert_eq!(config.session.thinking_linger_ms, 200);
        assert_eq!(config.session.send_timeout(), Duration::from_secs(2));
        assert!(config.email.is_empty());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.api.base_url, "http://localhost:8000");
        assert_eq!(config.connection, ConnectionConfig::default());
        assert_eq!(config.logging.format, "pretty");
    }
}
