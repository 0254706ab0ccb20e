//! Secret redaction over raw log buffers.
//!
//! Redaction never changes the length of the buffer: every replaced byte is
//! overwritten with [`FILLER`], so byte offsets recorded on the classified
//! lines stay valid afterwards.
//!
//! Each line's prefix and every newline are always kept. Inside a reviewed
//! line only the spans covered by a marker of a filtered kind are replaced.
//! Lines nobody reviewed, and bytes no line accounts for, are replaced as a
//! whole when `unidentified` is part of the filter.

use crate::classify::LogClassification;
use crate::parser::model::{LogLine, SecretKind};

pub const FILLER: u8 = b'X';

/// Parses a `filter_log_secret` setting.
///
/// `none` (or an empty value) selects nothing, `all` selects every kind.
/// Otherwise a comma list of kind names; unknown names are ignored.
pub fn parse_filter(setting: &str) -> Vec<SecretKind> {
    let mut kinds = Vec::new();
    for name in setting.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        match name {
            "none" => {}
            "all" => return SecretKind::ALL.to_vec(),
            _ => match SecretKind::from_name(name) {
                Some(kind) if !kinds.contains(&kind) => kinds.push(kind),
                Some(_) => {}
                None => tracing::warn!(name, "ignoring unknown log secret kind"),
            },
        }
    }
    kinds
}

/// Returns a copy of `buffer` with the selected secrets replaced.
pub fn redact_buffer(buffer: &[u8], lines: &[LogLine], filter: &[SecretKind]) -> Vec<u8> {
    if filter.is_empty() {
        return buffer.to_vec();
    }
    let unidentified = filter.contains(&SecretKind::Unidentified);
    let len = buffer.len();
    let clamp = |offset: usize| offset.min(len);

    let mut preserve: Vec<(usize, usize)> = Vec::new();
    let mut attributed: Vec<(usize, usize)> = Vec::new();

    for line in lines {
        let start = clamp(line.byte_start);
        let content_start = clamp(line.byte_content_start.max(line.byte_start));
        let end = clamp(line.byte_end.max(content_start));
        attributed.push((start, end));
        preserve.push((start, content_start));

        for (idx, byte) in buffer[content_start..end].iter().enumerate() {
            if *byte == b'\n' {
                preserve.push((content_start + idx, content_start + idx + 1));
            }
        }

        if is_unidentified(line) {
            if !unidentified {
                preserve.push((content_start, end));
            }
            continue;
        }

        let mut markers: Vec<_> = line
            .secret_markers
            .iter()
            .filter(|m| filter.contains(&m.kind) && m.byte_end > m.byte_start)
            .map(|m| (clamp(content_start + m.byte_start), clamp(content_start + m.byte_end)))
            .collect();
        markers.sort_unstable();

        let mut cursor = content_start;
        for (marker_start, marker_end) in markers {
            if marker_start > cursor {
                preserve.push((cursor, marker_start.min(end)));
            }
            cursor = cursor.max(marker_end);
        }
        if cursor < end {
            preserve.push((cursor, end));
        }
    }

    if !unidentified {
        preserve.extend(gaps(&mut attributed, len));
    }

    let mut out = buffer.to_vec();
    let mut cursor = 0;
    for (start, end) in merge(preserve) {
        out[cursor..start].fill(FILLER);
        cursor = end;
    }
    out[cursor..].fill(FILLER);
    out
}

/// Lines whose content nobody vouched for.
fn is_unidentified(line: &LogLine) -> bool {
    !line.reviewed_for_secrets || (line.is_top_level() && line.classification == LogClassification::Unknown)
}

/// Byte ranges of the buffer not covered by any line.
fn gaps(attributed: &mut [(usize, usize)], len: usize) -> Vec<(usize, usize)> {
    attributed.sort_unstable();
    let mut gaps = Vec::new();
    let mut cursor = 0;
    for &(start, end) in attributed.iter() {
        if start > cursor {
            gaps.push((cursor, start));
        }
        cursor = cursor.max(end);
    }
    if cursor < len {
        gaps.push((cursor, len));
    }
    gaps
}

/// Sorted, non-overlapping union of the given ranges.
fn merge(mut ranges: Vec<(usize, usize)>) -> Vec<(usize, usize)> {
    ranges.retain(|(start, end)| end > start);
    ranges.sort_unstable();

    let mut merged: Vec<(usize, usize)> = Vec::with_capacity(ranges.len());
    for (start, end) in ranges {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::formats::PrefixParser;
    use crate::parser::model::LogLevel;
    use crate::parser::prefix::SUPPORTED_PREFIXES;
    use crate::stream::parse_and_analyze_buffer;
    use test_case::test_case;

    const RDS_PREFIX: &str = "2018-03-11 20:00:02 UTC:1.1.1.1(2):a@b:[3]:";

    fn redact(filter: &str, input: &str) -> String {
        let template = SUPPORTED_PREFIXES
            .iter()
            .find(|p| p.name == "amazon_rds")
            .map(|p| p.template)
            .unwrap();
        let parser = PrefixParser::new(template, None);
        let analysis = parse_and_analyze_buffer(input, 0, None, &parser);
        let out = redact_buffer(input.as_bytes(), &analysis.lines, &parse_filter(filter));
        String::from_utf8(out).unwrap()
    }

    fn rds(rest: &str) -> String {
        format!("{RDS_PREFIX}{rest}")
    }

    // ── Filter parsing ──────────────────────────────────────────

    #[test_case("none", &[] ; "none")]
    #[test_case("", &[] ; "empty")]
    #[test_case("statement_text", &[SecretKind::StatementText] ; "single")]
    #[test_case("statement_parameter, unidentified", &[SecretKind::StatementParameter, SecretKind::Unidentified] ; "list with spaces")]
    #[test_case("ops,bogus,ops", &[SecretKind::Ops] ; "unknown and duplicate ignored")]
    fn test_parse_filter(setting: &str, expected: &[SecretKind]) {
        assert_eq!(parse_filter(setting), expected.to_vec());
    }

    #[test]
    fn test_parse_filter_all() {
        let kinds = parse_filter("all");
        assert_eq!(kinds, SecretKind::ALL.to_vec());
        assert!(kinds.contains(&SecretKind::Unidentified));
    }

    // ── Buffer redaction ────────────────────────────────────────

    #[test]
    fn test_all_replaces_only_query() {
        let input = rds("LOG:  duration: 1242.570 ms  statement: SELECT 1\n");
        let expected = rds("LOG:  duration: 1242.570 ms  statement: XXXXXXXX\n");
        assert_eq!(redact("all", &input), expected);
    }

    #[test]
    fn test_statement_text_on_multiline_execute() {
        let input = rds("LOG:  duration: 4079.697 ms  execute <unnamed>: \nSELECT * FROM x WHERE y = $1 LIMIT $2\n")
            + &rds("DETAIL:  parameters: $1 = 'long string', $2 = '1'\n");
        let expected = rds("LOG:  duration: 4079.697 ms  execute <unnamed>: \nXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXX\n")
            + &rds("DETAIL:  parameters: $1 = 'XXXXXXXXXXX', $2 = 'X'\n");
        assert_eq!(redact("statement_text, statement_parameter, unidentified", &input), expected);
    }

    #[test]
    fn test_statement_parameter_only() {
        let input = rds("LOG:  duration: 4079.697 ms  execute <unnamed>: \nSELECT * FROM x WHERE y = $1 LIMIT $2\n")
            + &rds("DETAIL:  parameters: $1 = 'long string', $2 = NULL, $3 = 'long string'\n");
        let expected = rds("LOG:  duration: 4079.697 ms  execute <unnamed>: \nSELECT * FROM x WHERE y = $1 LIMIT $2\n")
            + &rds("DETAIL:  parameters: $1 = 'XXXXXXXXXXX', $2 = NULL, $3 = 'XXXXXXXXXXX'\n");
        assert_eq!(redact("statement_parameter", &input), expected);
    }

    #[test]
    fn test_none_keeps_buffer() {
        let input = rds("ERROR:  division by zero\n") + &rds("ERROR:  Unknown Data\n");
        assert_eq!(redact("none", &input), input);
    }

    #[test]
    fn test_unidentified_replaces_unclassified_content() {
        let input = rds("ERROR:  division by zero\n") + &rds("ERROR:  Unknown Data\n");
        let expected = rds("ERROR:  division by zero\n") + &rds("ERROR:  XXXXXXXXXXXX\n");
        assert_eq!(redact("unidentified", &input), expected);
    }

    #[test]
    fn test_length_is_preserved() {
        let input = rds("LOG:  duration: 2007.111 ms  plan:\n{\"Query Text\": \"SELECT pg_sleep($1)\", \"Plan\": { } }\n");
        let out = redact("all", &input);
        assert_eq!(out.len(), input.len());
        assert!(out.starts_with(&rds("LOG:  duration: 2007.111 ms  plan:\n")));
        assert!(out.ends_with("\n"));
    }

    // ── Hand-built lines ────────────────────────────────────────

    fn built(buffer: &str, prefix_len: usize, level: LogLevel) -> LogLine {
        let mut line = LogLine::with_content(&buffer[prefix_len..], level);
        line.byte_end = buffer.len();
        line.byte_content_start = prefix_len;
        line
    }

    #[test]
    fn test_unattributed_tail() {
        let buffer = "abc: hello\ntrailing junk";
        let mut line = built(&buffer[..11], 5, LogLevel::Log);
        line.reviewed_for_secrets = true;
        line.classification = LogClassification::DivisionByZero;

        let kept = redact_buffer(buffer.as_bytes(), std::slice::from_ref(&line), &[SecretKind::Ops]);
        assert_eq!(kept, buffer.as_bytes());

        let replaced = redact_buffer(buffer.as_bytes(), &[line], &[SecretKind::Unidentified]);
        assert_eq!(replaced, b"abc: hello\nXXXXXXXXXXXXX".to_vec());
    }

    #[test]
    fn test_overlapping_and_empty_markers() {
        let buffer = "p| secret value here\n";
        let mut line = built(buffer, 3, LogLevel::Log);
        line.reviewed_for_secrets = true;
        line.classification = LogClassification::DivisionByZero;
        line.add_marker(0, 6, SecretKind::TableData);
        line.add_marker(3, 12, SecretKind::TableData);
        line.add_marker(13, 13, SecretKind::StatementParameter);

        let out = redact_buffer(buffer.as_bytes(), &[line], &SecretKind::ALL);
        assert_eq!(out, b"p| XXXXXXXXXXXX here\n".to_vec());
    }

    #[test]
    fn test_unreviewed_subsidiary_keeps_newlines() {
        let buffer = "p| first\nsecond\n";
        let mut line = built(buffer, 3, LogLevel::Detail);
        line.parent_uuid = uuid::Uuid::now_v7();

        let out = redact_buffer(buffer.as_bytes(), &[line], &[SecretKind::Unidentified]);
        assert_eq!(out, b"p| XXXXX\nXXXXXX\n".to_vec());
    }
}
