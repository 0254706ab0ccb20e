//! Autovacuum and autoanalyze report parsing.
//!
//! Reports come either comma-joined on one line or split over newline/tab
//! separated segments, and the set of segments grows with each server
//! version. Each segment is matched on its own so missing ones are skipped.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::parser::model::LogLine;

macro_rules! segment {
    ($name:ident, $re:literal) => {
        static $name: Lazy<Regex> = Lazy::new(|| Regex::new($re).expect("valid autovacuum regex"));
    };
}

segment!(VACUUM_HEADER, r#"^automatic (aggressive )?vacuum (to prevent wraparound )?of table "(.+?)":"#);
segment!(ANALYZE_HEADER, r#"^automatic analyze of table "(.+?)""#);
segment!(INDEX_SCANS, r"index scans: (\d+)");
segment!(
    PAGES,
    r"pages: (\d+) removed, (\d+) remain(?:, (\d+) skipped due to pins)?(?:, (\d+) skipped frozen)?"
);
segment!(
    TUPLES,
    r"tuples: (\d+) removed, (\d+) remain, (\d+) are dead but not yet removable(?:, oldest xmin: (\d+))?"
);
segment!(
    LPDEAD,
    r"index scan (needed|not needed|bypassed): (\d+) pages from table \(([\d.]+)% of total\) (?:had|have) (\d+) dead item identifiers"
);
segment!(IO_TIMINGS, r"I/O timings: read: ([\d.]+) ms, write: ([\d.]+) ms");
segment!(RATES, r"avg read rate: ([\d.]+) MB/s, avg write rate: ([\d.]+) MB/s");
segment!(BUFFERS, r"buffer usage: (\d+) hits, (\d+) misses, (\d+) dirtied");
segment!(WAL, r"WAL usage: (\d+) records, (\d+) full page images, (\d+) bytes");
segment!(
    SYSTEM_USAGE,
    r"system usage: CPU(?: ([\d.]+)s/([\d.]+)u sec elapsed ([\d.]+) sec|: user: ([\d.]+) s, system: ([\d.]+) s, elapsed: ([\d.]+) s)"
);

/// Sets database, schema and relation from a `db.schema.relation` name.
pub fn set_relation(line: &mut LogLine, qualified: &str) {
    let mut parts = qualified.splitn(3, '.');
    if let (Some(db), Some(schema), Some(rel)) = (parts.next(), parts.next(), parts.next()) {
        line.database = db.to_string();
        line.schema_name = schema.to_string();
        line.relation_name = rel.to_string();
    }
}

fn int(caps: &regex::Captures<'_>, idx: usize) -> Option<i64> {
    caps.get(idx).and_then(|m| m.as_str().parse().ok())
}

fn float(caps: &regex::Captures<'_>, idx: usize) -> Option<f64> {
    caps.get(idx).and_then(|m| m.as_str().parse().ok())
}

fn set_int(line: &mut LogLine, key: &str, value: Option<i64>) {
    if let Some(v) = value {
        line.set_detail(key, v);
    }
}

fn set_float(line: &mut LogLine, key: &str, value: Option<f64>) {
    if let Some(v) = value {
        line.set_detail(key, v);
    }
}

fn apply_system_usage(line: &mut LogLine, text: &str) {
    let Some(caps) = SYSTEM_USAGE.captures(text) else {
        return;
    };
    // Older servers print "CPU <system>s/<user>u sec elapsed <n> sec"
    let (kernel, user, elapsed) = if caps.get(1).is_some() {
        (float(&caps, 1), float(&caps, 2), float(&caps, 3))
    } else {
        (float(&caps, 5), float(&caps, 4), float(&caps, 6))
    };
    set_float(line, "rusage_kernel", kernel);
    set_float(line, "rusage_user", user);
    set_float(line, "elapsed_secs", elapsed);
}

fn apply_io(line: &mut LogLine, text: &str) {
    if let Some(caps) = IO_TIMINGS.captures(text) {
        set_float(line, "blk_read_time", float(&caps, 1));
        set_float(line, "blk_write_time", float(&caps, 2));
    }
    if let Some(caps) = RATES.captures(text) {
        set_float(line, "read_rate_mb", float(&caps, 1));
        set_float(line, "write_rate_mb", float(&caps, 2));
    }
}

/// Parses an `automatic vacuum of table` report. Returns `false` when the
/// header does not match.
pub fn parse_vacuum(line: &mut LogLine, text: &str) -> bool {
    let Some(header) = VACUUM_HEADER.captures(text) else {
        return false;
    };
    line.set_detail("aggressive", header.get(1).is_some());
    set_relation(line, &header[3]);

    if let Some(caps) = INDEX_SCANS.captures(text) {
        set_int(line, "num_index_scans", int(&caps, 1));
    }
    if let Some(caps) = PAGES.captures(text) {
        set_int(line, "pages_removed", int(&caps, 1));
        set_int(line, "rel_pages", int(&caps, 2));
        set_int(line, "pinskipped_pages", int(&caps, 3));
        set_int(line, "frozenskipped_pages", int(&caps, 4));
    }
    if let Some(caps) = TUPLES.captures(text) {
        set_int(line, "tuples_deleted", int(&caps, 1));
        set_int(line, "new_rel_tuples", int(&caps, 2));
        set_int(line, "new_dead_tuples", int(&caps, 3));
        set_int(line, "oldest_xmin", int(&caps, 4));
    }
    if let Some(caps) = LPDEAD.captures(text) {
        line.set_detail("anti_wraparound", header.get(2).is_some());
        line.set_detail("lpdead_index_scan", &caps[1]);
        set_int(line, "lpdead_item_pages", int(&caps, 2));
        set_float(line, "lpdead_item_page_percent", float(&caps, 3));
        set_int(line, "lpdead_items", int(&caps, 4));
    }
    apply_io(line, text);
    if let Some(caps) = BUFFERS.captures(text) {
        set_int(line, "vacuum_page_hit", int(&caps, 1));
        set_int(line, "vacuum_page_miss", int(&caps, 2));
        set_int(line, "vacuum_page_dirty", int(&caps, 3));
    }
    if let Some(caps) = WAL.captures(text) {
        set_int(line, "wal_records", int(&caps, 1));
        set_int(line, "wal_fpi", int(&caps, 2));
        set_int(line, "wal_bytes", int(&caps, 3));
    }
    apply_system_usage(line, text);
    true
}

/// Parses an `automatic analyze of table` report.
pub fn parse_analyze(line: &mut LogLine, text: &str) -> bool {
    let Some(header) = ANALYZE_HEADER.captures(text) else {
        return false;
    };
    set_relation(line, &header[1]);

    apply_io(line, text);
    if let Some(caps) = BUFFERS.captures(text) {
        set_int(line, "analyze_page_hit", int(&caps, 1));
        set_int(line, "analyze_page_miss", int(&caps, 2));
        set_int(line, "analyze_page_dirty", int(&caps, 3));
    }
    apply_system_usage(line, text);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::model::{DetailValue, LogLevel};

    fn parsed_vacuum(content: &str) -> LogLine {
        let mut line = LogLine::with_content(content, LogLevel::Log);
        assert!(parse_vacuum(&mut line, content));
        line
    }

    fn int_detail(line: &LogLine, key: &str) -> i64 {
        match line.details.get(key) {
            Some(DetailValue::Int(v)) => *v,
            other => panic!("{key}: {other:?}"),
        }
    }

    fn float_detail(line: &LogLine, key: &str) -> f64 {
        match line.details.get(key) {
            Some(DetailValue::Float(v)) => *v,
            other => panic!("{key}: {other:?}"),
        }
    }

    #[test]
    fn test_vacuum_legacy_newline_layout() {
        let line = parsed_vacuum(
            "automatic vacuum of table \"mydb.public.vac_test\": index scans: 1\n \
             pages: 0 removed, 1 remain, 0 skipped due to pins, 0 skipped frozen\n \
             tuples: 3 removed, 6 remain, 0 are dead but not yet removable\n \
             buffer usage: 70 hits, 4 misses, 4 dirtied\n \
             avg read rate: 62.877 MB/s, avg write rate: 62.877 MB/s\n \
             system usage: CPU 0.00s/0.00u sec elapsed 0.00 sec",
        );
        assert_eq!(line.database, "mydb");
        assert_eq!(line.schema_name, "public");
        assert_eq!(line.relation_name, "vac_test");
        assert_eq!(line.details.get("aggressive"), Some(&DetailValue::Bool(false)));
        assert!(!line.details.contains_key("anti_wraparound"));
        assert_eq!(int_detail(&line, "num_index_scans"), 1);
        assert_eq!(int_detail(&line, "rel_pages"), 1);
        assert_eq!(int_detail(&line, "tuples_deleted"), 3);
        assert_eq!(int_detail(&line, "new_rel_tuples"), 6);
        assert_eq!(int_detail(&line, "vacuum_page_hit"), 70);
        assert_eq!(float_detail(&line, "read_rate_mb"), 62.877);
        assert_eq!(float_detail(&line, "elapsed_secs"), 0.0);
        assert!(!line.details.contains_key("oldest_xmin"));
    }

    #[test]
    fn test_vacuum_tab_layout_with_xmin() {
        let line = parsed_vacuum(
            "automatic aggressive vacuum of table \"demo_pgbench.public.pgbench_tellers\": index scans: 0 \
             pages: 0 removed, 839 remain, 0 skipped due to pins, 705 skipped frozen\t\
             tuples: 1849 removed, 2556 remain, 5 are dead but not yet removable, oldest xmin: 448424944\t\
             buffer usage: 569 hits, 1 misses, 0 dirtied\t\
             avg read rate: 0.064 MB/s, avg write rate: 0.000 MB/s\t\
             system usage: CPU: user: 0.00 s, system: 0.00 s, elapsed: 0.12 s",
        );
        assert_eq!(line.details.get("aggressive"), Some(&DetailValue::Bool(true)));
        assert_eq!(int_detail(&line, "frozenskipped_pages"), 705);
        assert_eq!(int_detail(&line, "oldest_xmin"), 448424944);
        assert_eq!(float_detail(&line, "elapsed_secs"), 0.12);
    }

    #[test]
    fn test_vacuum_wraparound_with_lpdead_and_wal() {
        let line = parsed_vacuum(
            "automatic aggressive vacuum to prevent wraparound of table \"mydb.myschema.mytable\": index scans: 0\n\
             \tpages: 0 removed, 241245 remain, 0 skipped due to pins, 241244 skipped frozen\n\
             \ttuples: 0 removed, 17418745 remain, 0 are dead but not yet removable, oldest xmin: 538040633\n\
             \tindex scan not needed: 3 pages from table (0.01% of total) had 0 dead item identifiers removed\n\
             \tI/O timings: read: 10.540 ms, write: 0.000 ms\n\
             \tavg read rate: 38.748 MB/s, avg write rate: 0.538 MB/s\n\
             \tbuffer usage: 50 hits, 72 misses, 1 dirtied\n\
             \tWAL usage: 1 records, 1 full page images, 2147 bytes\n\
             \tsystem usage: CPU: user: 1.23 s, system: 4.56 s, elapsed: 0.01 s",
        );
        assert_eq!(line.details.get("anti_wraparound"), Some(&DetailValue::Bool(true)));
        assert_eq!(
            line.details.get("lpdead_index_scan"),
            Some(&DetailValue::Str("not needed".to_string()))
        );
        assert_eq!(float_detail(&line, "lpdead_item_page_percent"), 0.01);
        assert_eq!(float_detail(&line, "blk_read_time"), 10.54);
        assert_eq!(int_detail(&line, "wal_bytes"), 2147);
        assert_eq!(float_detail(&line, "rusage_user"), 1.23);
        assert_eq!(float_detail(&line, "rusage_kernel"), 4.56);
    }

    #[test]
    fn test_analyze_reports() {
        let text = "automatic analyze of table \"postgres.public.pgbench_branches\" system usage: CPU 1.02s/2.08u sec elapsed 108.25 sec";
        let mut line = LogLine::with_content(text, LogLevel::Log);
        assert!(parse_analyze(&mut line, text));
        assert_eq!(line.relation_name, "pgbench_branches");
        assert_eq!(float_detail(&line, "rusage_kernel"), 1.02);
        assert_eq!(float_detail(&line, "rusage_user"), 2.08);
        assert_eq!(float_detail(&line, "elapsed_secs"), 108.25);

        let text = "automatic analyze of table \"mydb.myschema.mytable\"\n\
                    \tI/O timings: read: 1.027 ms, write: 0.000 ms\n\
                    \tavg read rate: 1.339 MB/s, avg write rate: 8.705 MB/s\n\
                    \tbuffer usage: 1369 hits, 6 misses, 39 dirtied\n\
                    \tsystem usage: CPU: user: 0.02 s, system: 0.00 s, elapsed: 0.03 s";
        let mut line = LogLine::with_content(text, LogLevel::Log);
        assert!(parse_analyze(&mut line, text));
        assert_eq!(int_detail(&line, "analyze_page_hit"), 1369);
        assert_eq!(float_detail(&line, "write_rate_mb"), 8.705);
    }

    #[test]
    fn test_header_mismatch() {
        let mut line = LogLine::default();
        assert!(!parse_vacuum(&mut line, "automatic analyze of table \"a.b.c\""));
        assert!(!parse_analyze(&mut line, "automatic vacuum of table \"a.b.c\": index scans: 0"));
    }
}
