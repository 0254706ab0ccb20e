//! Byte-range helpers shared by the classification rules.
//!
//! All offsets are relative to the start of `LogLine::content` and are
//! computed on raw bytes, the same indexing the regex matches use.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::parser::model::{LogLine, SecretKind};

/// Appended by managed platforms when a message exceeds their size limit.
pub const TRUNCATION_MARKER: &str = "[Your log message was truncated]";

static BIND_PARAMETER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\d+ = (?:'((?:[^']|'')*)'|(NULL))").expect("valid parameter regex"));

static QUOTED: Lazy<Regex> = Lazy::new(|| Regex::new(r#""([^"]*)""#).expect("valid quoted regex"));

/// Content without its trailing line break.
pub fn body(content: &str) -> &str {
    content.trim_end_matches(['\n', '\r'])
}

pub fn was_truncated(text: &str) -> bool {
    text.trim_end().ends_with(TRUNCATION_MARKER)
}

/// Marks `[start, end)` after shrinking it past surrounding whitespace.
pub fn mark_trimmed(line: &mut LogLine, start: usize, end: usize, kind: SecretKind) {
    let end = end.min(line.content.len());
    if start >= end {
        return;
    }
    let slice = &line.content[start..end];
    let lead = slice.len() - slice.trim_start().len();
    let trail = slice.len() - slice.trim_end().len();
    if start + lead < end - trail {
        line.add_marker(start + lead, end - trail, kind);
    }
}

/// Marks everything from `start` to the end of the line body.
pub fn mark_rest(line: &mut LogLine, start: usize, kind: SecretKind) {
    let end = body(&line.content).len();
    mark_trimmed(line, start, end, kind);
}

/// Marks the whole line body.
pub fn mark_all(line: &mut LogLine, kind: SecretKind) {
    mark_rest(line, 0, kind);
}

/// Marks the first capture group of every match of `re`.
pub fn mark_groups(line: &mut LogLine, re: &Regex, kind: SecretKind) {
    let spans: Vec<(usize, usize)> = re
        .captures_iter(body(&line.content))
        .filter_map(|c| c.get(1))
        .map(|m| (m.start(), m.end()))
        .collect();
    for (start, end) in spans {
        if start < end {
            line.add_marker(start, end, kind);
        }
    }
}

/// Marks the inside of every double-quoted span.
pub fn mark_quoted(line: &mut LogLine, kind: SecretKind) {
    mark_groups(line, &QUOTED, kind);
}

/// Marks the values of a `$1 = 'x', $2 = NULL` bind list found at or after
/// `from`, returning them in order.
///
/// Quoted values are marked without their quotes. NULL produces a zero-length
/// marker at its position so the parameter slot stays visible.
pub fn mark_parameters(line: &mut LogLine, from: usize) -> Vec<Option<String>> {
    let (spans, values): (Vec<_>, Vec<_>) = bind_parameters(body(&line.content), from).into_iter().unzip();
    for (start, end) in spans {
        line.add_marker(start, end, SecretKind::StatementParameter);
    }
    values
}

/// Bind values of a parameter list without touching any markers.
pub fn bind_values(text: &str) -> Vec<Option<String>> {
    bind_parameters(text, 0).into_iter().map(|(_, v)| v).collect()
}

fn bind_parameters(text: &str, from: usize) -> Vec<((usize, usize), Option<String>)> {
    if from > text.len() || !text.is_char_boundary(from) {
        return Vec::new();
    }
    BIND_PARAMETER
        .captures_iter(&text[from..])
        .filter_map(|caps| {
            if let Some(value) = caps.get(1) {
                Some(((from + value.start(), from + value.end()), Some(value.as_str().replace("''", "'"))))
            } else {
                caps.get(2).map(|null| ((from + null.start(), from + null.start()), None))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::model::{LogLevel, SecretMarker};

    fn line(content: &str) -> LogLine {
        LogLine::with_content(content, LogLevel::Detail)
    }

    #[test]
    fn test_body_strips_line_break() {
        assert_eq!(body("SELECT 1\n"), "SELECT 1");
        assert_eq!(body("SELECT 1\r\n"), "SELECT 1");
        assert_eq!(body("SELECT 1"), "SELECT 1");
    }

    #[test]
    fn test_truncation() {
        assert!(was_truncated("SELECT ...[Your log message was truncated]\n"));
        assert!(!was_truncated("SELECT 1"));
    }

    #[test]
    fn test_mark_trimmed_skips_whitespace() {
        let mut l = line("statement:   SELECT 1  \n");
        mark_rest(&mut l, 10, SecretKind::StatementText);
        assert_eq!(l.secret_markers, vec![SecretMarker::new(13, 21, SecretKind::StatementText)]);
    }

    #[test]
    fn test_mark_trimmed_ignores_blank_range() {
        let mut l = line("statement:    ");
        mark_rest(&mut l, 10, SecretKind::StatementText);
        assert!(l.secret_markers.is_empty());
    }

    #[test]
    fn test_mark_quoted() {
        let mut l = line("invalid value \"string\" for \"YYYY\"");
        mark_quoted(&mut l, SecretKind::TableData);
        assert_eq!(
            l.secret_markers,
            vec![
                SecretMarker::new(15, 21, SecretKind::TableData),
                SecretMarker::new(28, 32, SecretKind::TableData),
            ]
        );
    }

    // ── Bind parameters ─────────────────────────────────────────

    #[test]
    fn test_mark_parameters_quoted() {
        let mut l = line("parameters: $1 = '1', $2 = 't'");
        let values = mark_parameters(&mut l, 0);
        assert_eq!(values, vec![Some("1".to_string()), Some("t".to_string())]);
        assert_eq!(
            l.secret_markers,
            vec![
                SecretMarker::new(18, 19, SecretKind::StatementParameter),
                SecretMarker::new(28, 29, SecretKind::StatementParameter),
            ]
        );
    }

    #[test]
    fn test_mark_parameters_null_is_zero_length() {
        let mut l = line("parameters: $1 = 'long string', $2 = NULL, $3 = '10'");
        let values = mark_parameters(&mut l, 0);
        assert_eq!(values, vec![Some("long string".to_string()), None, Some("10".to_string())]);
        assert_eq!(l.secret_markers[1], SecretMarker::new(37, 37, SecretKind::StatementParameter));
        assert_eq!(l.secret_markers[2], SecretMarker::new(49, 51, SecretKind::StatementParameter));
    }

    #[test]
    fn test_mark_parameters_unescapes_quotes() {
        let mut l = line("parameters: $1 = 'bo''o'");
        let values = mark_parameters(&mut l, 0);
        assert_eq!(values, vec![Some("bo'o".to_string())]);
        assert_eq!(l.secret_markers[0], SecretMarker::new(18, 23, SecretKind::StatementParameter));
    }

    #[test]
    fn test_bind_values_leaves_markers_alone() {
        let values = bind_values("parameters: $1 = 'a', $2 = NULL");
        assert_eq!(values, vec![Some("a".to_string()), None]);
    }
}
