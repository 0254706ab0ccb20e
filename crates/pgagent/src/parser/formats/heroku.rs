use once_cell::sync::Lazy;
use regex::Regex;

use super::prefix::PrefixParser;
use crate::parser::model::{DetectionResult, LogLevel};
use crate::parser::traits::{FormatDetector, LineParser, LogFormat, LogLine, ParseOutcome};

/// `[COLOR] [n-m] <payload>`, optionally behind a drain header
static HEROKU_DRAIN_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^(\w+ \d+ \d+:\d+:\d+ \w+ app\[postgres\] \w+ )?\[(\w+)\] \[\d+-\d+\] (.+)")
        .expect("valid heroku drain regex")
});

/// Strip the Heroku drain wrapper, returning the Postgres payload.
///
/// Lines that do not carry the wrapper are returned unchanged. The payload
/// is always a suffix of the input, so byte offsets stay valid.
pub fn strip_drain_wrapper(line: &str) -> &str {
    HEROKU_DRAIN_LINE
        .captures(line)
        .and_then(|caps| caps.get(3))
        .map_or(line, |m| m.as_str())
}

/// Reader for Heroku Postgres log drains.
///
/// Removes the drain wrapper and hands the payload to a prefix parser
/// configured with one of the Heroku `log_line_prefix` templates.
#[derive(Debug, Clone)]
pub struct HerokuDrainParser {
    inner: PrefixParser,
}

impl HerokuDrainParser {
    pub fn new(template: &str) -> Self {
        Self {
            inner: PrefixParser::new(template, None),
        }
    }
}

impl LineParser for HerokuDrainParser {
    fn parse_line(&self, line: &str) -> ParseOutcome {
        match self.inner.parse_line(strip_drain_wrapper(line)) {
            ParseOutcome::Line(l) => ParseOutcome::Line(l),
            ParseOutcome::Continuation(l) => {
                ParseOutcome::Continuation(LogLine::with_content(l.content, LogLevel::Unknown))
            }
        }
    }

    fn format(&self) -> LogFormat {
        LogFormat::HerokuDrain
    }
}

impl FormatDetector for HerokuDrainParser {
    fn detect(&self, sample: &str) -> DetectionResult {
        let Some(payload) = HEROKU_DRAIN_LINE.captures(sample).and_then(|caps| caps.get(3)) else {
            return DetectionResult::no_match();
        };
        if self.inner.detect(payload.as_str()).confidence > 0.0 {
            DetectionResult::new(LogFormat::HerokuDrain, Some(self.inner.template().to_string()), 0.95)
        } else {
            DetectionResult::no_match()
        }
    }

    fn format(&self) -> LogFormat {
        LogFormat::HerokuDrain
    }
}
