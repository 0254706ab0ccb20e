//! Load: config loading from file and environment variables.

use std::path::Path;

use super::model::{AgentConfig, ServerConfig};
use super::ConfigError;

pub const DEFAULT_CONFIG_FILE: &str = "/etc/pgagent/agent.toml";

impl AgentConfig {
    /// Load configuration from file or environment variables
    /// Priority: Environment Variables > Config File > Defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("PGAGENT_CONFIG_FILE").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(config_path)
    }

    /// Like [`AgentConfig::load`], with an explicit config file path.
    pub fn load_from(config_path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config_path = config_path.as_ref();
        let mut config = if config_path.exists() {
            tracing::info!("Loading configuration from: {}", config_path.display());
            Self::from_file(config_path)?
        } else {
            tracing::info!("Config file not found at {}, using environment variables", config_path.display());
            Self::from_env()
        };

        config.apply_env_overrides();
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Load configuration from environment variables with sensible defaults
    ///
    /// A single server is configured when `PGAGENT_LOG_LOCATION` is set.
    pub fn from_env() -> Self {
        let servers = std::env::var("PGAGENT_LOG_LOCATION")
            .ok()
            .map(|log_location| ServerConfig {
                name: std::env::var("PGAGENT_SERVER_NAME").unwrap_or_else(|_| "default".to_string()),
                log_location,
                log_line_prefix: std::env::var("PGAGENT_LOG_LINE_PREFIX").unwrap_or_default(),
                log_timezone: std::env::var("PGAGENT_LOG_TIMEZONE").ok(),
                log_syslog: env_parse("PGAGENT_LOG_SYSLOG").unwrap_or(false),
                filter_log_secret: std::env::var("PGAGENT_FILTER_LOG_SECRET").ok(),
            })
            .into_iter()
            .collect();

        Self {
            flush_interval_ms: env_parse("PGAGENT_FLUSH_INTERVAL_MS").unwrap_or(1000),
            default_filter_log_secret: std::env::var("PGAGENT_DEFAULT_FILTER_LOG_SECRET")
                .unwrap_or_else(|_| "none".to_string()),
            debug_logs: env_parse("PGAGENT_DEBUG_LOGS").unwrap_or(false),
            servers,
        }
    }

    /// Environment variables override file config for global settings
    fn apply_env_overrides(&mut self) {
        if let Some(interval) = env_parse("PGAGENT_FLUSH_INTERVAL_MS") {
            self.flush_interval_ms = interval;
        }
        if let Ok(filter) = std::env::var("PGAGENT_DEFAULT_FILTER_LOG_SECRET") {
            self.default_filter_log_secret = filter;
        }
        if let Some(debug) = env_parse("PGAGENT_DEBUG_LOGS") {
            self.debug_logs = debug;
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}
