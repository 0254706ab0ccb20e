use chrono::{Datelike, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::parser::model::{DetectionResult, LogLevel};
use crate::parser::prefix::{application_fragment, PrefixField};
use crate::parser::time;
use crate::parser::traits::{FormatDetector, LineParser, LogFormat, LogLine, ParseOutcome};

/// `<month day time> <host> <process>[<pid>]: [<seq>] <level>: <content>`
static RSYSLOG_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\w+\s+\d+ \d{2}:\d{2}:\d{2}) (\S+) (\w+)\[(\d+)\]: (\[[\d-]+\])? (?:(\w+):\s+)?(.*\n?)$")
        .expect("valid rsyslog regex")
});

/// Postgres prefix carried inside the syslog message body.
static EMBEDDED_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?s)^\[user=(\S*),db=(\S*),app=({})\] (\w+):\s+(.*\n?)$",
        application_fragment(Some(']'))
    ))
    .expect("valid embedded prefix regex")
});

/// Parser for rsyslog-wrapped Postgres output.
///
/// Syslog drops the year, so the current year is assumed unless one is
/// pinned with [`SyslogParser::with_year`].
#[derive(Debug, Clone, Default)]
pub struct SyslogParser {
    tz: Option<Tz>,
    year: Option<i32>,
}

impl SyslogParser {
    pub fn new(tz: Option<Tz>) -> Self {
        Self { tz, year: None }
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }
}

impl LineParser for SyslogParser {
    fn parse_line(&self, line: &str) -> ParseOutcome {
        let Some(caps) = RSYSLOG_LINE.captures(line) else {
            return ParseOutcome::Continuation(LogLine::with_content(line, LogLevel::Unknown));
        };
        let group = |i: usize| caps.get(i).map_or("", |m| m.as_str());

        let year = self.year.unwrap_or_else(|| Utc::now().year());
        let mut log_line = LogLine {
            occurred_at: time::resolve_syslog(group(1), year, self.tz),
            backend_pid: group(4).parse().unwrap_or(0),
            ..Default::default()
        };
        // Content stays a suffix of the physical line; `#011` is only
        // unescaped in derived query text
        let body = group(7);
        let mut level = group(6);
        let mut content = body;

        if let Some(inner) = EMBEDDED_PREFIX.captures(body) {
            let inner_group = |i: usize| inner.get(i).map_or("", |m| m.as_str());
            PrefixField::Username.apply(&mut log_line, inner_group(1), None);
            PrefixField::Database.apply(&mut log_line, inner_group(2), None);
            PrefixField::Application.apply(&mut log_line, inner_group(3), None);
            level = inner_group(4);
            content = inner_group(5);
        }
        log_line.content = content.to_string();

        // No level word means this physical line continues the previous message
        if level.is_empty() {
            return ParseOutcome::Continuation(log_line);
        }
        log_line.log_level = LogLevel::from_name(level);
        ParseOutcome::Line(log_line)
    }

    fn format(&self) -> LogFormat {
        LogFormat::Syslog
    }
}

impl FormatDetector for SyslogParser {
    fn detect(&self, sample: &str) -> DetectionResult {
        if RSYSLOG_LINE.is_match(sample) {
            DetectionResult::new(LogFormat::Syslog, None, 0.95)
        } else {
            DetectionResult::no_match()
        }
    }

    fn format(&self) -> LogFormat {
        LogFormat::Syslog
    }
}
