//! `log_line_prefix` compiler.
//!
//! Turns a template such as `%m [%p] %q[user=%u,db=%d,app=%a] ` into an
//! anchored regex with one capture per recognised escape, followed by the
//! level word and the remaining content.

use chrono_tz::Tz;
use regex::Regex;

use super::model::LogLine;
use super::time;

const TIME_FRAGMENT: &str = r"\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}(?:\.\d+)? [\-+]?\w+";
const LEVEL_AND_CONTENT: &str = r"(\w+):\s+(.*\n?)$";

/// What a captured escape writes into a `LogLine`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixField {
    /// `%t`, `%m`
    Time,
    /// `%n`
    UnixTime,
    /// `%p`
    Pid,
    /// `%u`
    Username,
    /// `%d`
    Database,
    /// `%a`
    Application,
    /// `%h`
    ClientHost,
    /// `%r`, host with an optional `(port)` suffix
    RemoteHostPort,
    /// `%l`
    LineNumber,
    /// Captured to keep the pattern aligned, value unused
    Ignored(char),
}

impl PrefixField {
    pub fn apply(&self, line: &mut LogLine, value: &str, tz: Option<Tz>) {
        match self {
            PrefixField::Time => line.occurred_at = time::resolve(value, tz),
            PrefixField::UnixTime => line.occurred_at = time::resolve_unix(value),
            PrefixField::Pid => line.backend_pid = value.parse().unwrap_or(0),
            PrefixField::Username => line.username = known(value),
            PrefixField::Database => line.database = known(value),
            PrefixField::Application => line.application = known(value),
            PrefixField::ClientHost => line.client_host = value.to_string(),
            PrefixField::RemoteHostPort => {
                let host = value.split_once('(').map_or(value, |(host, _)| host);
                line.client_host = host.to_string();
            }
            PrefixField::LineNumber => line.log_line_number = value.parse().unwrap_or(0),
            PrefixField::Ignored(_) => {}
        }
    }
}

/// Postgres writes `[unknown]` for fields not yet known during startup.
fn known(value: &str) -> String {
    if value == "[unknown]" {
        String::new()
    } else {
        value.to_string()
    }
}

/// Regex fragment for `%a`, chosen by the character that follows it.
pub(crate) fn application_fragment(next: Option<char>) -> &'static str {
    match next {
        Some(']') => r"\[unknown\]|[^,]*?",
        Some(',') => r"[^,]*",
        Some('"') => r#"[^"]*"#,
        _ => r"\S*",
    }
}

/// Fragment, optionality and target field for each recognised escape.
fn escape_spec(escape: char, next: Option<char>) -> Option<(&'static str, bool, PrefixField)> {
    let spec = match escape {
        't' | 'm' => (TIME_FRAGMENT, false, PrefixField::Time),
        's' => (TIME_FRAGMENT, false, PrefixField::Ignored('s')),
        'n' => (r"\d+\.\d+", false, PrefixField::UnixTime),
        'r' => (r".+(?:\(\d+\))?", true, PrefixField::RemoteHostPort),
        'h' => (r"\S*", false, PrefixField::ClientHost),
        'p' => (r"\d+", false, PrefixField::Pid),
        'P' => (r"\d+", false, PrefixField::Ignored('P')),
        'l' => (r"\d+", false, PrefixField::LineNumber),
        'x' => (r"\d+", false, PrefixField::Ignored('x')),
        'u' => (r"\S*", false, PrefixField::Username),
        'd' => (r"\S*", false, PrefixField::Database),
        'a' => (application_fragment(next), false, PrefixField::Application),
        'v' => (r"\d+/\d+", true, PrefixField::Ignored('v')),
        'e' => (r"\w{5}", false, PrefixField::Ignored('e')),
        'c' => (r"\w+\.\w+", false, PrefixField::Ignored('c')),
        'b' => (r"[\w ]+", false, PrefixField::Ignored('b')),
        'i' => (r"\w*", false, PrefixField::Ignored('i')),
        'Q' => (r"-?\d+", false, PrefixField::Ignored('Q')),
        _ => return None,
    };
    Some(spec)
}

/// A compiled `log_line_prefix`.
#[derive(Debug, Clone)]
pub struct CompiledPrefix {
    template: String,
    regex: Option<Regex>,
    fields: Vec<PrefixField>,
}

impl CompiledPrefix {
    /// Compile a template. Never fails: unknown escapes are dropped and an
    /// empty template yields a prefix that matches nothing.
    pub fn compile(template: &str) -> Self {
        if template.is_empty() {
            return Self {
                template: String::new(),
                regex: None,
                fields: Vec::new(),
            };
        }

        let chars: Vec<char> = template.chars().collect();
        let mut pattern = String::from("(?s)^");
        let mut literal = String::new();
        let mut fields = Vec::new();
        let mut conditional_open = false;

        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if c != '%' {
                literal.push(c);
                i += 1;
                continue;
            }
            // A trailing '%' has nothing to escape
            let Some(&escape) = chars.get(i + 1) else {
                break;
            };
            let next = chars.get(i + 2).copied();
            i += 2;

            if escape == '%' {
                literal.push('%');
                continue;
            }

            pattern.push_str(&regex::escape(&literal));
            literal.clear();

            if escape == 'q' {
                if !conditional_open {
                    pattern.push_str("(?:");
                    conditional_open = true;
                }
                continue;
            }

            let Some((fragment, optional, field)) = escape_spec(escape, next) else {
                continue;
            };
            pattern.push('(');
            pattern.push_str(fragment);
            pattern.push(')');
            if optional {
                pattern.push('?');
            }
            fields.push(field);
        }
        pattern.push_str(&regex::escape(&literal));
        if conditional_open {
            pattern.push_str(")?");
        }
        pattern.push_str(LEVEL_AND_CONTENT);

        let regex = match Regex::new(&pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!(template, error = %e, "log_line_prefix did not compile, treating every line as a continuation");
                None
            }
        };

        Self {
            template: template.to_string(),
            regex,
            fields,
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn regex(&self) -> Option<&Regex> {
        self.regex.as_ref()
    }

    pub fn pattern(&self) -> Option<&str> {
        self.regex.as_ref().map(|re| re.as_str())
    }

    pub fn fields(&self) -> &[PrefixField] {
        &self.fields
    }

    pub fn has_field(&self, field: PrefixField) -> bool {
        self.fields.contains(&field)
    }
}

/// A prefix template known to parse correctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupportedPrefix {
    pub name: &'static str,
    pub template: &'static str,
}

/// Supported templates. Custom4 sits ahead of Custom3 so auto-detection
/// prefers the more specific of the two.
pub const SUPPORTED_PREFIXES: &[SupportedPrefix] = &[
    SupportedPrefix { name: "amazon_rds", template: "%t:%r:%u@%d:[%p]:" },
    SupportedPrefix { name: "azure", template: "%t-%c-" },
    SupportedPrefix { name: "custom1", template: "%m [%p][%v] : [%l-1] %q[app=%a] " },
    SupportedPrefix { name: "custom2", template: "%t [%p-%l] %q%u@%d " },
    SupportedPrefix { name: "custom4", template: "%m [%p] %q[user=%u,db=%d,app=%a,host=%h] " },
    SupportedPrefix { name: "custom3", template: "%m [%p] %q[user=%u,db=%d,app=%a] " },
    SupportedPrefix { name: "custom5", template: "%t [%p]: [%l-1] user=%u,db=%d - PG-%e " },
    SupportedPrefix { name: "custom6", template: "%t [%p]: [%l-1] user=%u,db=%d,app=%a,client=%h " },
    SupportedPrefix { name: "custom7", template: "%t [%p]: [%l-1] [trx_id=%x] user=%u,db=%d " },
    SupportedPrefix { name: "custom8", template: "[%p]: [%l-1] db=%d,user=%u " },
    SupportedPrefix { name: "custom9", template: "%m %r %u %a [%c] [%p] " },
    SupportedPrefix { name: "custom10", template: "%m [%p]: [%l-1] db=%d,user=%u " },
    SupportedPrefix { name: "custom11", template: "pid=%p,user=%u,db=%d,app=%a,client=%h " },
    SupportedPrefix { name: "custom12", template: "user=%u,db=%d,app=%a,client=%h " },
    SupportedPrefix { name: "custom13", template: "%p-%s-%c-%l-%h-%u-%d-%m " },
    SupportedPrefix { name: "custom14", template: "%m [%p][%b][%v][%x] %q[user=%u,db=%d,app=%a] " },
    SupportedPrefix { name: "custom15", template: "%m [%p] %q%u@%d " },
    SupportedPrefix { name: "custom16", template: "%t [%p] %q%u@%d %h " },
    SupportedPrefix { name: "simple", template: "%m [%p] " },
    SupportedPrefix { name: "heroku1", template: " sql_error_code = %e " },
    SupportedPrefix {
        name: "heroku2",
        template: r#" sql_error_code = %e time_ms = "%m" pid="%p" proc_start_time="%s" session_id="%c" vtid="%v" tid="%x" log_line="%l" %qdatabase="%d" connection_source="%r" user="%u" application_name="%a" "#,
    },
    SupportedPrefix { name: "empty", template: "" },
];

pub fn is_supported_prefix(template: &str) -> bool {
    SUPPORTED_PREFIXES.iter().any(|p| p.template == template)
}

/// Advisory check: lines without a database or role are hard to attribute.
///
/// Returns a human-readable warning; callers log it and carry on.
pub fn validate_prefix(template: &str) -> Result<(), String> {
    let compiled = CompiledPrefix::compile(template);
    if !compiled.has_field(PrefixField::Database) && !compiled.has_field(PrefixField::Username) {
        return Err(format!(
            "log_line_prefix {:?} includes neither %d nor %u, lines cannot be attributed to a database or role",
            template
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Compilation ─────────────────────────────────────────────

    #[test]
    fn test_compile_simple() {
        let p = CompiledPrefix::compile("%m [%p] ");
        assert_eq!(
            p.pattern().unwrap(),
            format!(r"(?s)^({}) \[(\d+)\] (\w+):\s+(.*\n?)$", TIME_FRAGMENT)
        );
        assert_eq!(p.fields(), &[PrefixField::Time, PrefixField::Pid]);
    }

    #[test]
    fn test_compile_conditional_group_wraps_rest_of_prefix() {
        let p = CompiledPrefix::compile("%t [%p-%l] %q%u@%d ");
        let pattern = p.pattern().unwrap();
        assert!(pattern.ends_with(r"(?:(\S*)@(\S*) )?(\w+):\s+(.*\n?)$"), "{}", pattern);
        assert_eq!(
            p.fields(),
            &[
                PrefixField::Time,
                PrefixField::Pid,
                PrefixField::LineNumber,
                PrefixField::Username,
                PrefixField::Database
            ]
        );
    }

    #[test]
    fn test_second_conditional_stays_in_open_group() {
        let p = CompiledPrefix::compile("%q%u %q%d ");
        let pattern = p.pattern().unwrap();
        assert_eq!(pattern.matches("(?:").count(), 1);
        assert!(pattern.ends_with(r"(?:(\S*) (\S*) )?(\w+):\s+(.*\n?)$"), "{}", pattern);
    }

    #[test]
    fn test_compile_literal_percent_and_trailing_escape() {
        let p = CompiledPrefix::compile("100%% [%p] %");
        assert_eq!(p.pattern().unwrap(), r"(?s)^100% \[(\d+)\] (\w+):\s+(.*\n?)$");
        assert_eq!(p.fields(), &[PrefixField::Pid]);
    }

    #[test]
    fn test_compile_unknown_escape_dropped() {
        let p = CompiledPrefix::compile("%z[%p] ");
        assert_eq!(p.fields(), &[PrefixField::Pid]);
        assert_eq!(p.pattern().unwrap(), r"(?s)^\[(\d+)\] (\w+):\s+(.*\n?)$");
    }

    #[test]
    fn test_compile_optional_escapes() {
        let p = CompiledPrefix::compile("%r %v ");
        assert_eq!(
            p.pattern().unwrap(),
            r"(?s)^(.+(?:\(\d+\))?)? (\d+/\d+)? (\w+):\s+(.*\n?)$"
        );
    }

    #[test]
    fn test_application_fragment_by_next_char() {
        assert_eq!(application_fragment(Some(']')), r"\[unknown\]|[^,]*?");
        assert_eq!(application_fragment(Some(',')), r"[^,]*");
        assert_eq!(application_fragment(Some('"')), r#"[^"]*"#);
        assert_eq!(application_fragment(Some(' ')), r"\S*");
        assert_eq!(application_fragment(None), r"\S*");
    }

    #[test]
    fn test_empty_template_has_no_regex() {
        let p = CompiledPrefix::compile("");
        assert!(p.regex().is_none());
        assert!(p.fields().is_empty());
    }

    #[test]
    fn test_all_supported_prefixes_compile() {
        for prefix in SUPPORTED_PREFIXES {
            let compiled = CompiledPrefix::compile(prefix.template);
            if prefix.template.is_empty() {
                assert!(compiled.regex().is_none());
            } else {
                assert!(compiled.regex().is_some(), "{} did not compile", prefix.name);
            }
        }
    }

    // ── Validation ──────────────────────────────────────────────

    #[test]
    fn test_validate_prefix() {
        assert!(validate_prefix("%m [%p] %q[user=%u,db=%d,app=%a] ").is_ok());
        assert!(validate_prefix("%m [%p] %q%u ").is_ok());
        assert!(validate_prefix("%m [%p] ").is_err());
        assert!(validate_prefix("%%d %%u ").is_err());
    }

    #[test]
    fn test_is_supported_prefix() {
        assert!(is_supported_prefix("%m [%p] "));
        assert!(is_supported_prefix(""));
        assert!(!is_supported_prefix("%m [%p] %z "));
    }

    // ── Field setters ───────────────────────────────────────────

    #[test]
    fn test_setters() {
        let mut line = LogLine::default();
        PrefixField::Username.apply(&mut line, "[unknown]", None);
        PrefixField::Database.apply(&mut line, "mydb", None);
        PrefixField::RemoteHostPort.apply(&mut line, "127.0.0.1(36404)", None);
        PrefixField::Pid.apply(&mut line, "18762", None);
        PrefixField::LineNumber.apply(&mut line, "", None);
        assert_eq!(line.username, "");
        assert_eq!(line.database, "mydb");
        assert_eq!(line.client_host, "127.0.0.1");
        assert_eq!(line.backend_pid, 18762);
        assert_eq!(line.log_line_number, 0);
    }
}
