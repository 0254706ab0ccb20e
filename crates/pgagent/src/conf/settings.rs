//! Settings: checks Postgres logging settings before collecting logs.

/// Lowest `log_min_duration_statement` that keeps log volume manageable
pub const MIN_SUPPORTED_LOG_MIN_DURATION_STATEMENT: i64 = 100;

/// A server setting as reported by `pg_settings`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresSetting {
    pub name: String,
    pub current_value: Option<String>,
}

impl PostgresSetting {
    pub fn new(name: &str, current_value: &str) -> Self {
        Self {
            name: name.to_string(),
            current_value: Some(current_value.to_string()),
        }
    }
}

/// Reasons log collection should be disabled for a server.
///
/// Settings that make Postgres log every statement would flood the
/// pipeline. An empty result means collection can go ahead. A
/// `log_min_duration_statement` of -1 turns duration logging off and is not
/// a reason to disable.
pub fn validate_log_settings(settings: &[PostgresSetting]) -> Vec<String> {
    let mut reasons = Vec::new();
    for setting in settings {
        let Some(value) = setting.current_value.as_deref() else {
            continue;
        };
        match setting.name.as_str() {
            "log_min_duration_statement" => {
                let Ok(ms) = value.trim().parse::<i64>() else {
                    continue;
                };
                if (0..MIN_SUPPORTED_LOG_MIN_DURATION_STATEMENT).contains(&ms) {
                    reasons.push(format!(
                        "log_min_duration_statement is set to '{}', below minimum supported threshold '{}'",
                        ms, MIN_SUPPORTED_LOG_MIN_DURATION_STATEMENT
                    ));
                }
            }
            "log_duration" if value == "on" => {
                reasons.push("log_duration is set to unsupported value 'on'".to_string());
            }
            "log_statement" if value == "all" => {
                reasons.push("log_statement is set to unsupported value 'all'".to_string());
            }
            _ => {}
        }
    }
    reasons
}
