pub use super::model::{DetectionResult, LogFormat, LogLine, ParseError, ParseOutcome};

pub trait FormatDetector: Send + Sync {
    fn detect(&self, sample: &str) -> DetectionResult;
    fn format(&self) -> LogFormat;
}

pub trait LineParser: Send + Sync {
    /// Parse one physical line (including its trailing newline, if any).
    fn parse_line(&self, line: &str) -> ParseOutcome;
    fn format(&self) -> LogFormat;

    /// Raw-bytes entry point used by readers that have not decoded the line yet.
    fn parse_bytes(&self, raw: &[u8]) -> Result<ParseOutcome, ParseError> {
        if raw.len() > super::MAX_LINE_SIZE {
            return Err(ParseError::LineTooLarge(raw.len(), super::MAX_LINE_SIZE));
        }
        let text = std::str::from_utf8(raw).map_err(|_| ParseError::NonUtf8)?;
        Ok(self.parse_line(text))
    }
}
