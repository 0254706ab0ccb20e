/// Classification of Postgres log lines
///
/// The analyzer walks one backend's lines at a time. Each primary line
/// collects the subsidiary lines that follow it (DETAIL, HINT, CONTEXT,
/// STATEMENT, QUERY), links them through `parent_uuid`, and is matched
/// against the ordered rule table in `rules.rs`.
///
/// # Secret review
///
/// Query text in STATEMENT and QUERY lines is always marked, whether or not
/// the primary matched. Everything else counts as reviewed only once a rule
/// has looked at the group; an unmatched primary and its DETAIL, HINT and
/// CONTEXT lines stay unreviewed and are treated as wholly unidentified when
/// redacting.

pub mod autovacuum;
pub mod classification;
pub mod markers;
pub mod rules;

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use crate::parser::formats::unwrap_continuations;
use crate::parser::model::{LogLevel, LogLine, QuerySample, SecretKind};
pub use classification::LogClassification;
use markers::{body, mark_all, mark_groups, mark_parameters, mark_rest, was_truncated};
use rules::Group;

/// Subsidiary lines considered after each primary line
pub const MAX_SUBSIDIARIES: usize = 4;

static SQL_STATEMENT_CONTEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^SQL statement "(.*)"$"#).expect("valid sql statement regex"));
static JSON_DATA_CONTEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^JSON data, line \d+: (.*)").expect("valid json data regex"));

const PARAMETERS_LEAD: &str = "parameters: ";
const PREPARE_LEAD: &str = "prepare: ";
const WITH_PARAMETERS: &str = "with parameters: ";

/// Classifies a batch that may mix backends.
///
/// Lines are grouped by backend pid, keeping each backend's relative order;
/// backends are emitted in order of first appearance.
pub fn analyze_lines(lines: Vec<LogLine>) -> (Vec<LogLine>, Vec<QuerySample>) {
    let mut order: Vec<i32> = Vec::new();
    let mut backends: HashMap<i32, Vec<LogLine>> = HashMap::new();
    for line in lines {
        let pid = line.backend_pid;
        backends
            .entry(pid)
            .or_insert_with(|| {
                order.push(pid);
                Vec::new()
            })
            .push(line);
    }

    let mut out = Vec::new();
    let mut samples = Vec::new();
    for pid in order {
        let Some(backend) = backends.remove(&pid) else {
            continue;
        };
        let (lines, backend_samples) = analyze_backend_lines(backend);
        tracing::trace!(pid, lines = lines.len(), samples = backend_samples.len(), "analyzed backend");
        out.extend(lines);
        samples.extend(backend_samples);
    }
    (out, samples)
}

/// Classifies one backend's stitched lines in place.
pub fn analyze_backend_lines(mut lines: Vec<LogLine>) -> (Vec<LogLine>, Vec<QuerySample>) {
    let mut samples = Vec::new();
    let mut idx = 0;

    while idx < lines.len() {
        let (head, rest) = lines.split_at_mut(idx + 1);
        let primary = &mut head[idx];
        let count = rest
            .iter()
            .take(MAX_SUBSIDIARIES)
            .take_while(|l| l.log_level.is_subsidiary())
            .count();

        analyze_group(primary, &mut rest[..count], &mut samples);
        idx += 1 + count;
    }

    (lines, samples)
}

fn analyze_group(primary: &mut LogLine, subsidiaries: &mut [LogLine], samples: &mut Vec<QuerySample>) {
    if primary.uuid.is_nil() {
        primary.uuid = Uuid::now_v7();
    }

    for sub in subsidiaries.iter_mut() {
        if sub.uuid.is_nil() {
            sub.uuid = Uuid::now_v7();
        }
        sub.parent_uuid = primary.uuid;
        if sub.log_level == LogLevel::Statement && !was_truncated(&sub.content) {
            primary.query = Some(unwrap_continuations(body(&sub.content)).into_owned());
        }
        mark_subsidiary(sub);
    }

    let text = body(&primary.content).to_string();
    let matched = rules::classify(&mut Group {
        text: &text,
        primary: &mut *primary,
        subsidiaries: &mut *subsidiaries,
        samples,
    });

    if matched {
        primary.reviewed_for_secrets = true;
        for sub in subsidiaries.iter_mut() {
            sub.reviewed_for_secrets = true;
        }
    }
}

/// Markers every subsidiary gets regardless of the primary's classification.
fn mark_subsidiary(sub: &mut LogLine) {
    match sub.log_level {
        LogLevel::Statement | LogLevel::Query => {
            mark_all(sub, SecretKind::StatementText);
            sub.reviewed_for_secrets = true;
        }
        LogLevel::Detail => {
            if sub.content.starts_with(PARAMETERS_LEAD) {
                mark_parameters(sub, PARAMETERS_LEAD.len());
            } else if sub.content.starts_with(PREPARE_LEAD) {
                mark_rest(sub, PREPARE_LEAD.len(), SecretKind::StatementText);
            }
        }
        LogLevel::Context => {
            mark_groups(sub, &SQL_STATEMENT_CONTEXT, SecretKind::StatementText);
            mark_groups(sub, &JSON_DATA_CONTEXT, SecretKind::TableData);
            if let Some(pos) = sub.content.find(WITH_PARAMETERS) {
                mark_parameters(sub, pos + WITH_PARAMETERS.len());
            }
        }
        _ => {}
    }
}

/// Classification counts, for diagnostics.
pub fn count_classifications(lines: &[LogLine]) -> Vec<(LogClassification, usize)> {
    let mut counts: HashMap<LogClassification, usize> = HashMap::new();
    for line in lines.iter().filter(|l| l.is_top_level()) {
        *counts.entry(line.classification).or_default() += 1;
    }
    let mut counts: Vec<_> = counts.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    counts
}
