/// Query samples
///
/// Samples carry the query text, runtime and bind values of a single
/// statement execution, taken from `log_min_duration_statement` output or
/// from auto_explain plans. Both are produced while classifying the primary
/// line, so the handlers here are rule callbacks.

pub mod explain;
pub mod tags;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::classify::markers::{bind_values, mark_rest, was_truncated};
use crate::classify::rules::{float, Group};
use crate::parser::formats::unwrap_continuations;
use crate::parser::model::{LogLine, QuerySample, SecretKind};

pub use explain::ExplainError;

static DURATION_STATEMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^duration: ([\d\.]+) ms([^:]+):(.+)").expect("valid duration regex"));

const PARAMETERS_LEAD: &str = "parameters: ";

/// Builds a sample attributed to `line`, with tags lexed from the query.
pub fn new_sample(line: &LogLine, query: String, runtime_ms: f64) -> QuerySample {
    QuerySample {
        tags: tags::parse_tags(&query),
        query,
        runtime_ms,
        occurred_at: line.occurred_at,
        username: line.username.clone(),
        database: line.database.clone(),
        log_line_uuid: line.uuid,
        ..Default::default()
    }
}

/// Rule callback for `duration: N ms  <step>: <query>` lines.
///
/// Bind and parse steps of the extended protocol are not executions and do
/// not produce samples. A bare `duration: N ms` line carries nothing more
/// than its classification.
pub fn duration(g: &mut Group<'_>, caps: &Captures<'_>) {
    let runtime_ms = float(caps, 1).unwrap_or_default();
    let Some(parts) = DURATION_STATEMENT.captures(g.text) else {
        return;
    };
    let Some(query) = parts.get(3) else {
        return;
    };

    if was_truncated(g.text) {
        g.primary.set_detail("truncated", true);
        // A STATEMENT subsidiary may have filled this in during grouping
        g.primary.query = None;
        mark_rest(g.primary, query.start(), SecretKind::StatementText);
        return;
    }

    let unwrapped = unwrap_continuations(query.as_str());
    let text = unwrapped.trim();
    mark_rest(g.primary, query.start(), SecretKind::StatementText);
    if text.is_empty() {
        return;
    }
    g.primary.query = Some(text.to_string());

    let step = parts[2].split_whitespace().next().unwrap_or_default();
    if matches!(step, "bind" | "parse") {
        return;
    }

    let parameters = g
        .detail_text()
        .filter(|d| d.starts_with(PARAMETERS_LEAD))
        .map(|d| bind_values(&d))
        .unwrap_or_default();

    let mut sample = new_sample(g.primary, text.to_string(), runtime_ms);
    sample.parameters = parameters;
    g.samples.push(sample);
}
