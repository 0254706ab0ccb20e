//! Query tags from SQL comments.
//!
//! Two tag styles are recognised inside `--` and `/* */` comments:
//! sqlcommenter (`key='value'`, backslash-escaped and URL-encoded) and
//! marginalia (`key:value`). Comments are found with a small lexer so that
//! comment-like text inside string literals is ignored.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

static SINGLE_QUOTED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^'(.*)'$").expect("valid quoted value regex"));
static META_CHARACTER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\(.)").expect("valid meta character regex"));

/// Tags found in the query's comments. Later keys override earlier ones.
pub fn parse_tags(query: &str) -> BTreeMap<String, String> {
    let mut tags = BTreeMap::new();
    for comment in comments(query) {
        for part in comment.trim().split(',') {
            if let Some((key, value)) = sqlcommenter_pair(part) {
                let value = value.trim();
                let value = SINGLE_QUOTED
                    .captures(value)
                    .and_then(|c| c.get(1))
                    .map_or(value, |m| m.as_str());
                tags.insert(decode(key.trim()), decode(value));
            } else if let Some((key, value)) = part.split_once(':') {
                tags.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
    }
    tags
}

/// `key=value` where the key holds no `:`, which would make it marginalia.
fn sqlcommenter_pair(part: &str) -> Option<(&str, &str)> {
    part.split_once('=').filter(|(key, _)| !key.contains(':'))
}

/// Backslash-unescape, then URL-decode. Undecodable input is kept as is.
fn decode(text: &str) -> String {
    let unescaped = META_CHARACTER.replace_all(text, "$1");
    urlencoding::decode(&unescaped)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| unescaped.to_string())
}

/// Bodies of all comments in `sql`, skipping quoted literals, quoted
/// identifiers and dollar-quoted strings.
fn comments(sql: &str) -> Vec<&str> {
    let bytes = sql.as_bytes();
    let mut found = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\'' | b'"' => i = skip_quoted(bytes, i),
            b'$' => i = skip_dollar_quoted(sql, i),
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                let start = i + 2;
                let end = sql[start..].find('\n').map_or(sql.len(), |n| start + n);
                found.push(&sql[start..end]);
                i = end;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let start = i + 2;
                let (body_end, next) = block_comment_end(bytes, start);
                found.push(&sql[start..body_end]);
                i = next;
            }
            _ => i += 1,
        }
    }
    found
}

/// Index just past a `'...'` or `"..."` run; doubled quotes stay inside.
fn skip_quoted(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

/// Index just past a `$tag$...$tag$` string, or past the `$` when it does
/// not open one (e.g. a `$1` parameter).
fn skip_dollar_quoted(sql: &str, start: usize) -> usize {
    let rest = &sql[start + 1..];
    let tag_len = rest
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
        .count();
    let opens = rest.as_bytes().get(tag_len) == Some(&b'$')
        && rest.bytes().next().is_some_and(|b| !b.is_ascii_digit());
    if !opens {
        return start + 1;
    }

    let delimiter = &sql[start..start + tag_len + 2];
    let body_start = start + delimiter.len();
    match sql[body_start..].find(delimiter) {
        Some(n) => body_start + n + delimiter.len(),
        None => sql.len(),
    }
}

/// End of a block comment body and the index after its terminator.
/// Block comments nest.
fn block_comment_end(bytes: &[u8], start: usize) -> (usize, usize) {
    let mut depth = 1;
    let mut i = start;
    while i + 1 < bytes.len() {
        match (bytes[i], bytes[i + 1]) {
            (b'/', b'*') => {
                depth += 1;
                i += 2;
            }
            (b'*', b'/') => {
                depth -= 1;
                if depth == 0 {
                    return (i, i + 2);
                }
                i += 2;
            }
            _ => i += 1,
        }
    }
    (bytes.len(), bytes.len())
}
