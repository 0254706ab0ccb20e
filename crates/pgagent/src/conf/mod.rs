//! Conf module: configuration model, loading, and Postgres logging checks.

pub mod load;
pub mod model;
pub mod settings;

pub use model::{AgentConfig, ServerConfig};
pub use settings::{validate_log_settings, PostgresSetting};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid TOML in config file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
