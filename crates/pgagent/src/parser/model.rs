use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::classify::LogClassification;

/// Which reader produced a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Lines carrying a compiled `log_line_prefix`
    Prefix,
    /// rsyslog-wrapped output
    Syslog,
    /// Heroku Postgres log drain
    HerokuDrain,
    /// Not detected yet
    Unknown,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Prefix => "prefix",
            LogFormat::Syslog => "syslog",
            LogFormat::HerokuDrain => "heroku_drain",
            LogFormat::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub format: LogFormat,
    /// Matched `log_line_prefix`, for `LogFormat::Prefix`
    pub template: Option<String>,
    /// Confidence level (0.0 - 1.0)
    pub confidence: f32,
}

impl DetectionResult {
    pub fn new(format: LogFormat, template: Option<String>, confidence: f32) -> Self {
        Self {
            format,
            template,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn no_match() -> Self {
        Self {
            format: LogFormat::Unknown,
            template: None,
            confidence: 0.0,
        }
    }

    pub fn is_high_confidence(&self) -> bool {
        self.confidence >= super::HIGH_CONFIDENCE_THRESHOLD
    }
}

/// Severity word Postgres writes in front of each message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    /// Not a recognised level word. Downstream this marks a continuation.
    #[default]
    Unknown,
    Debug5,
    Debug4,
    Debug3,
    Debug2,
    Debug1,
    Info,
    Notice,
    Warning,
    Error,
    Log,
    Fatal,
    Panic,
    Detail,
    Hint,
    Context,
    Statement,
    Query,
}

impl LogLevel {
    pub fn from_name(name: &str) -> Self {
        match name {
            "DEBUG5" => LogLevel::Debug5,
            "DEBUG4" => LogLevel::Debug4,
            "DEBUG3" => LogLevel::Debug3,
            "DEBUG2" => LogLevel::Debug2,
            "DEBUG1" => LogLevel::Debug1,
            "INFO" => LogLevel::Info,
            "NOTICE" => LogLevel::Notice,
            "WARNING" => LogLevel::Warning,
            "ERROR" => LogLevel::Error,
            "LOG" => LogLevel::Log,
            "FATAL" => LogLevel::Fatal,
            "PANIC" => LogLevel::Panic,
            "DETAIL" => LogLevel::Detail,
            "HINT" => LogLevel::Hint,
            "CONTEXT" => LogLevel::Context,
            "STATEMENT" => LogLevel::Statement,
            "QUERY" => LogLevel::Query,
            _ => LogLevel::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Unknown => "UNKNOWN",
            LogLevel::Debug5 => "DEBUG5",
            LogLevel::Debug4 => "DEBUG4",
            LogLevel::Debug3 => "DEBUG3",
            LogLevel::Debug2 => "DEBUG2",
            LogLevel::Debug1 => "DEBUG1",
            LogLevel::Info => "INFO",
            LogLevel::Notice => "NOTICE",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Log => "LOG",
            LogLevel::Fatal => "FATAL",
            LogLevel::Panic => "PANIC",
            LogLevel::Detail => "DETAIL",
            LogLevel::Hint => "HINT",
            LogLevel::Context => "CONTEXT",
            LogLevel::Statement => "STATEMENT",
            LogLevel::Query => "QUERY",
        }
    }

    /// Levels that elaborate on the preceding primary line.
    pub fn is_subsidiary(&self) -> bool {
        matches!(
            self,
            LogLevel::Detail | LogLevel::Hint | LogLevel::Context | LogLevel::Statement | LogLevel::Query
        )
    }
}

/// Sensitivity category of a marked byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretKind {
    Credential,
    ParsingError,
    StatementText,
    StatementParameter,
    TableData,
    Ops,
    Unidentified,
}

impl SecretKind {
    pub const ALL: [SecretKind; 7] = [
        SecretKind::Credential,
        SecretKind::ParsingError,
        SecretKind::StatementText,
        SecretKind::StatementParameter,
        SecretKind::TableData,
        SecretKind::Ops,
        SecretKind::Unidentified,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SecretKind::Credential => "credential",
            SecretKind::ParsingError => "parsing_error",
            SecretKind::StatementText => "statement_text",
            SecretKind::StatementParameter => "statement_parameter",
            SecretKind::TableData => "table_data",
            SecretKind::Ops => "ops",
            SecretKind::Unidentified => "unidentified",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        SecretKind::ALL.iter().copied().find(|k| k.as_str() == name)
    }
}

/// Byte range inside a line's content, relative to the content start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretMarker {
    pub byte_start: usize,
    pub byte_end: usize,
    pub kind: SecretKind,
}

impl SecretMarker {
    pub fn new(byte_start: usize, byte_end: usize, kind: SecretKind) -> Self {
        Self { byte_start, byte_end, kind }
    }
}

/// Typed scalar or list stored in `LogLine::details`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DetailValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    IntList(Vec<i64>),
}

impl From<bool> for DetailValue {
    fn from(v: bool) -> Self {
        DetailValue::Bool(v)
    }
}

impl From<i64> for DetailValue {
    fn from(v: i64) -> Self {
        DetailValue::Int(v)
    }
}

impl From<f64> for DetailValue {
    fn from(v: f64) -> Self {
        DetailValue::Float(v)
    }
}

impl From<&str> for DetailValue {
    fn from(v: &str) -> Self {
        DetailValue::Str(v.to_string())
    }
}

impl From<String> for DetailValue {
    fn from(v: String) -> Self {
        DetailValue::Str(v)
    }
}

impl From<Vec<i64>> for DetailValue {
    fn from(v: Vec<i64>) -> Self {
        DetailValue::IntList(v)
    }
}

pub type Details = BTreeMap<String, DetailValue>;

/// One logical log line.
///
/// Byte offsets point into the raw buffer the line was read from and
/// satisfy `byte_start <= byte_content_start <= byte_end`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogLine {
    pub uuid: Uuid,
    /// Nil for top-level lines
    pub parent_uuid: Uuid,

    pub byte_start: usize,
    pub byte_content_start: usize,
    pub byte_end: usize,

    /// `None` when the timestamp could not be resolved
    pub occurred_at: Option<DateTime<Utc>>,
    /// When the reader picked the line up, used for the grace period
    pub collected_at: Option<DateTime<Utc>>,

    pub username: String,
    pub database: String,
    pub application: String,
    pub client_host: String,
    pub schema_name: String,
    pub relation_name: String,
    pub query: Option<String>,

    pub log_level: LogLevel,
    pub backend_pid: i32,
    pub log_line_number: i32,
    pub content: String,

    pub classification: LogClassification,
    pub details: Details,
    pub related_pids: Vec<i32>,
    pub reviewed_for_secrets: bool,
    pub secret_markers: Vec<SecretMarker>,
}

impl LogLine {
    pub fn with_content(content: impl Into<String>, log_level: LogLevel) -> Self {
        Self {
            content: content.into(),
            log_level,
            ..Default::default()
        }
    }

    pub fn is_top_level(&self) -> bool {
        self.parent_uuid.is_nil()
    }

    pub fn add_marker(&mut self, byte_start: usize, byte_end: usize, kind: SecretKind) {
        self.secret_markers.push(SecretMarker::new(byte_start, byte_end, kind));
    }

    pub fn set_detail(&mut self, key: &str, value: impl Into<DetailValue>) {
        self.details.insert(key.to_string(), value.into());
    }
}

/// Origin of an EXPLAIN plan attached to a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplainSource {
    AutoExplain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplainFormat {
    Json,
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExplainOutput {
    Json(serde_json::Value),
    Text(String),
}

/// Query text and runtime captured from a duration or auto_explain line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuerySample {
    pub query: String,
    pub runtime_ms: f64,
    pub occurred_at: Option<DateTime<Utc>>,
    pub username: String,
    pub database: String,
    pub log_line_uuid: Uuid,
    /// Bind values in order, `None` for SQL NULL
    pub parameters: Vec<Option<String>>,
    pub has_explain: bool,
    pub explain_source: Option<ExplainSource>,
    pub explain_format: Option<ExplainFormat>,
    pub explain_output: Option<ExplainOutput>,
    pub tags: BTreeMap<String, String>,
}

/// Result of handing one physical line to a `LineParser`.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// A new logical line
    Line(LogLine),
    /// No prefix matched; `content` holds the whole physical line
    Continuation(LogLine),
}

impl ParseOutcome {
    pub fn is_line(&self) -> bool {
        matches!(self, ParseOutcome::Line(_))
    }

    pub fn into_inner(self) -> LogLine {
        match self {
            ParseOutcome::Line(l) | ParseOutcome::Continuation(l) => l,
        }
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Line too large: {0} bytes (max: {1} bytes)")]
    LineTooLarge(usize, usize),

    #[error("Non-UTF8 content")]
    NonUtf8,
}
