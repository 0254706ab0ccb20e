/// Stream and buffer assembly
///
/// Two ways in: `buffer` parses a raw chunk read from a log file, keeping
/// byte offsets into that chunk; `assembler` takes already parsed lines from
/// a live stream, holds back the ones that may still receive continuation
/// lines, and lays the rest out in a fresh buffer.

pub mod assembler;
pub mod buffer;
pub mod metrics;

pub use assembler::{analyze_stream, StreamBatch, GRACE_PERIOD};
pub use buffer::{parse_and_analyze_buffer, BufferAnalysis};
pub use metrics::{MetricsSnapshot, PipelineMetrics};

use crate::classify::LogClassification;
use crate::parser::model::{DetailValue, LogLine};

/// Whether `lines` carry the collector's identify event for `section`.
///
/// Used as a self-test that a log stream actually reaches the agent.
pub fn identify_succeeded(lines: &[LogLine], section: &str) -> bool {
    lines.iter().any(|line| {
        line.classification == LogClassification::PgaCollectorIdentify
            && matches!(line.details.get("config_section"), Some(DetailValue::Str(s)) if s == section)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::analyze_backend_lines;
    use crate::parser::model::LogLevel;

    #[test]
    fn test_identify_succeeded() {
        let (lines, _) = analyze_backend_lines(vec![LogLine::with_content(
            "pganalyze-collector-identify: server1\n",
            LogLevel::Log,
        )]);
        assert!(identify_succeeded(&lines, "server1"));
        assert!(!identify_succeeded(&lines, "server2"));
        assert!(!identify_succeeded(&[], "server1"));
    }
}
