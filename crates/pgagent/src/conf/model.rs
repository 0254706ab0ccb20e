//! Model: AgentConfig and ServerConfig.

use std::collections::HashSet;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::parser::prefix::validate_prefix;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// How often the pipeline flushes collected lines
    pub flush_interval_ms: u64,
    /// Secret kinds removed before hand-off, for servers without their own setting
    pub default_filter_log_secret: String,
    /// Print a classification summary instead of handing lines off
    pub debug_logs: bool,
    pub servers: Vec<ServerConfig>,
}

/// One monitored Postgres server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub name: String,
    /// Log file to tail
    pub log_location: String,
    /// Empty means auto-detect from the supported templates
    pub log_line_prefix: String,
    pub log_timezone: Option<String>,
    pub log_syslog: bool,
    pub filter_log_secret: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: 1000,
            default_filter_log_secret: "none".to_string(),
            debug_logs: false,
            servers: Vec::new(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            log_location: String::new(),
            log_line_prefix: String::new(),
            log_timezone: None,
            log_syslog: false,
            filter_log_secret: None,
        }
    }
}

impl AgentConfig {
    /// Validate configuration values
    ///
    /// Prefix templates that cannot attribute lines to a database or role
    /// are only warned about.
    pub fn validate(&self) -> Result<(), String> {
        if self.flush_interval_ms == 0 {
            return Err("flush_interval_ms must be > 0".to_string());
        }

        let mut names = HashSet::new();
        for server in &self.servers {
            server.validate()?;
            if !names.insert(server.name.as_str()) {
                return Err(format!("duplicate server name: {}", server.name));
            }
        }
        Ok(())
    }

    /// Effective secret filter for `server`.
    pub fn filter_for<'a>(&'a self, server: &'a ServerConfig) -> &'a str {
        server
            .filter_log_secret
            .as_deref()
            .unwrap_or(&self.default_filter_log_secret)
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("server name must not be empty".to_string());
        }
        if self.log_location.is_empty() {
            return Err(format!("server {}: log_location must not be empty", self.name));
        }
        self.timezone()?;

        if !self.log_line_prefix.is_empty() {
            if let Err(warning) = validate_prefix(&self.log_line_prefix) {
                tracing::warn!(server = %self.name, "{}", warning);
            }
        }
        Ok(())
    }

    /// Parsed `log_timezone`, if set.
    pub fn timezone(&self) -> Result<Option<Tz>, String> {
        match self.log_timezone.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(name) => name
                .parse::<Tz>()
                .map(Some)
                .map_err(|_| format!("server {}: unknown log_timezone {:?}", self.name, name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(name: &str) -> ServerConfig {
        ServerConfig {
            name: name.to_string(),
            log_location: "/var/log/postgresql/postgresql.log".to_string(),
            ..Default::default()
        }
    }

    // ── Defaults ────────────────────────────────────────────────

    #[test]
    fn test_agent_config_defaults() {
        let cfg = AgentConfig::default();
        assert_eq!(cfg.flush_interval_ms, 1000);
        assert_eq!(cfg.default_filter_log_secret, "none");
        assert!(!cfg.debug_logs);
        assert!(cfg.servers.is_empty());
    }

    #[test]
    fn test_server_config_defaults() {
        let s = ServerConfig::default();
        assert_eq!(s.name, "default");
        assert!(s.log_line_prefix.is_empty());
        assert!(s.log_timezone.is_none());
        assert!(!s.log_syslog);
    }

    // ── Validation ──────────────────────────────────────────────

    #[test]
    fn test_validate_default_passes() {
        assert!(AgentConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let cfg = AgentConfig {
            flush_interval_ms: 0,
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.contains("flush_interval_ms"), "Error should mention flush_interval_ms: {}", err);
    }

    #[test]
    fn test_validate_rejects_duplicate_names() {
        let cfg = AgentConfig {
            servers: vec![server("db1"), server("db1")],
            ..Default::default()
        };
        assert!(cfg.validate().unwrap_err().contains("duplicate"));
    }

    #[test]
    fn test_validate_rejects_empty_name() {
        let cfg = AgentConfig {
            servers: vec![server("  ")],
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_timezone() {
        let mut s = server("db1");
        s.log_timezone = Some("Mars/Olympus".to_string());
        assert!(s.validate().unwrap_err().contains("log_timezone"));

        s.log_timezone = Some("Europe/Berlin".to_string());
        assert_eq!(s.timezone().unwrap(), Some(chrono_tz::Europe::Berlin));
    }

    #[test]
    fn test_validate_prefix_without_db_or_user_is_a_warning() {
        let mut s = server("db1");
        s.log_line_prefix = "%m [%p] ".to_string();
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_filter_for_falls_back_to_default() {
        let cfg = AgentConfig {
            default_filter_log_secret: "all".to_string(),
            ..Default::default()
        };
        let mut s = server("db1");
        assert_eq!(cfg.filter_for(&s), "all");
        s.filter_log_secret = Some("statement_text".to_string());
        assert_eq!(cfg.filter_for(&s), "statement_text");
    }

    // ── TOML ────────────────────────────────────────────────────

    #[test]
    fn test_deserialize_partial_toml() {
        let toml_str = r#"
            flush_interval_ms = 250

            [[servers]]
            name = "primary"
            log_location = "/var/log/postgresql/postgresql-16-main.log"
            log_line_prefix = "%m [%p] %q%u@%d "
            log_timezone = "UTC"
        "#;
        let cfg: AgentConfig = toml::from_str(toml_str).expect("Should accept partial TOML");
        assert_eq!(cfg.flush_interval_ms, 250);
        assert_eq!(cfg.default_filter_log_secret, "none");
        assert_eq!(cfg.servers.len(), 1);
        assert_eq!(cfg.servers[0].name, "primary");
        assert!(!cfg.servers[0].log_syslog);
        assert!(cfg.validate().is_ok());
    }
}
