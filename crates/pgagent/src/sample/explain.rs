//! auto_explain plan payloads.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use thiserror::Error;

use super::new_sample;
use crate::classify::markers::{mark_rest, TRUNCATION_MARKER};
use crate::classify::rules::{float, Group};
use crate::parser::formats::unwrap_continuations;
use crate::parser::model::{ExplainFormat, ExplainOutput, ExplainSource, SecretKind};

#[derive(Debug, Error)]
pub enum ExplainError {
    #[error("auto_explain output was truncated and can't be parsed as JSON")]
    Truncated,

    #[error("unsupported auto_explain format")]
    UnsupportedFormat,

    #[error("auto_explain output doesn't match expected format")]
    NoMatch,

    #[error("auto_explain JSON is malformed: {0}")]
    Json(#[from] serde_json::Error),
}

static WITH_PARAMETERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^Query Text: ([\s\S]+)\r?\n\s*Query Parameters: (.+)\r?\n\s*([\s\S]+)")
        .expect("valid explain parameters regex")
});
static WITH_COSTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^Query Text: ([\s\S]+?)\r?\n\s*([\S ]+  \(cost=\d+\.\d{2}\.\.\d+\.\d{2} rows=\d+ width=\d+\)[\s\S]+)",
    )
    .expect("valid explain costs regex")
});
static LOOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Query Text: (.+)\s+([\s\S]+)").expect("valid explain fallback regex"));
// Heroku splits long query text with a tab instead of a line break
static TAB_SEPARATED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Query Text: ([^\t]+)\t([\s\S]+)").expect("valid explain tab regex"));
static PARAMETER_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'((?:[^']|'')*)'|NULL").expect("valid explain parameter regex"));

/// Query and plan lifted out of an auto_explain payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedExplain {
    pub query: String,
    pub parameters: Vec<Option<String>>,
    pub format: ExplainFormat,
    pub output: ExplainOutput,
}

/// Parses the plan that follows `duration: N ms  plan:`.
///
/// The truncation check runs first so a cut-off JSON document never reaches
/// the JSON parser.
pub fn parse_auto_explain(text: &str) -> Result<ParsedExplain, ExplainError> {
    if text.starts_with('{') {
        if text.contains(TRUNCATION_MARKER) {
            return Err(ExplainError::Truncated);
        }
        parse_json(text)
    } else if text.starts_with("Query Text:") {
        parse_text(text)
    } else {
        Err(ExplainError::UnsupportedFormat)
    }
}

fn parse_json(text: &str) -> Result<ParsedExplain, ExplainError> {
    let mut plan: Value = serde_json::from_str(text)?;
    let Some(object) = plan.as_object_mut() else {
        return Err(ExplainError::NoMatch);
    };

    // The query goes to the sample, not into the stored plan
    let query = match object.remove("Query Text") {
        Some(Value::String(q)) => q.trim().to_string(),
        _ => String::new(),
    };
    let parameters = match object.get("Query Parameters") {
        Some(Value::String(p)) => parameter_values(p),
        _ => Vec::new(),
    };

    Ok(ParsedExplain {
        query,
        parameters,
        format: ExplainFormat::Json,
        output: ExplainOutput::Json(plan),
    })
}

fn parse_text(text: &str) -> Result<ParsedExplain, ExplainError> {
    if let Some(caps) = WITH_PARAMETERS.captures(text) {
        return Ok(ParsedExplain {
            query: caps[1].trim().to_string(),
            parameters: parameter_values(&caps[2]),
            format: ExplainFormat::Text,
            output: ExplainOutput::Text(caps[3].to_string()),
        });
    }

    let mut caps = WITH_COSTS
        .captures(text)
        .or_else(|| LOOSE.captures(text))
        .ok_or(ExplainError::NoMatch)?;

    let starts_upper = caps[2].bytes().next().is_some_and(|b| b.is_ascii_uppercase());
    if !starts_upper {
        if let Some(tabbed) = TAB_SEPARATED.captures(text) {
            caps = tabbed;
        }
    }

    Ok(ParsedExplain {
        query: caps[1].trim().to_string(),
        parameters: Vec::new(),
        format: ExplainFormat::Text,
        output: ExplainOutput::Text(caps[2].to_string()),
    })
}

/// Values of a `$1 = 'foo', $2 = NULL` list, `None` for NULL.
fn parameter_values(text: &str) -> Vec<Option<String>> {
    PARAMETER_VALUE
        .captures_iter(text)
        .map(|c| c.get(1).map(|v| v.as_str().replace("''", "'")))
        .collect()
}

/// Rule callback for `duration: N ms  plan:` lines.
///
/// The whole plan is statement text. Parse failures are recorded on the
/// line as `query_sample_error` and drop only the sample.
pub fn auto_explain(g: &mut Group<'_>, caps: &Captures<'_>) {
    let Some(plan) = caps.get(2) else {
        return;
    };
    let runtime_ms = float(caps, 1).unwrap_or_default();
    mark_rest(g.primary, plan.start(), SecretKind::StatementText);

    match parse_auto_explain(unwrap_continuations(plan.as_str()).trim()) {
        Ok(parsed) => {
            g.primary.query = Some(parsed.query.clone());
            let mut sample = new_sample(g.primary, parsed.query, runtime_ms);
            sample.parameters = parsed.parameters;
            sample.has_explain = true;
            sample.explain_source = Some(ExplainSource::AutoExplain);
            sample.explain_format = Some(parsed.format);
            sample.explain_output = Some(parsed.output);
            g.samples.push(sample);
        }
        Err(e) => {
            tracing::debug!(error = %e, "dropping auto_explain sample");
            g.primary.set_detail("query_sample_error", e.to_string());
        }
    }
}
