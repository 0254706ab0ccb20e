//! Operator-facing classification summary.

use std::io::{self, Write};

use crate::classify::{count_classifications, LogClassification};
use crate::parser::model::{LogLine, QuerySample};

/// Writes classification counts for `lines`, then every unclassified
/// top-level line with its raw text from `buffer`.
pub fn write_summary<W: Write>(
    out: &mut W,
    buffer: &str,
    lines: &[LogLine],
    samples: &[QuerySample],
) -> io::Result<()> {
    writeln!(out, "log lines: {}, query samples: {}", lines.len(), samples.len())?;
    for (classification, count) in count_classifications(lines) {
        writeln!(out, "{count} x {}", classification.as_str())?;
    }

    let unclassified: Vec<&LogLine> = lines
        .iter()
        .filter(|l| l.is_top_level() && l.classification == LogClassification::Unknown)
        .collect();
    if unclassified.is_empty() {
        return Ok(());
    }

    writeln!(out, "\nUnclassified log lines:")?;
    for line in unclassified {
        let raw = buffer.get(line.byte_start..line.byte_end).unwrap_or(&line.content);
        let content = buffer
            .get(line.byte_content_start..line.byte_end)
            .unwrap_or(&line.content);
        writeln!(out, "{}", raw.trim_end_matches('\n'))?;
        writeln!(out, "  Level: {}", line.log_level.as_str())?;
        writeln!(out, "  Content: {content:?}")?;
        writeln!(out, "---")?;
    }
    Ok(())
}

/// [`write_summary`] into a string.
pub fn summary(buffer: &str, lines: &[LogLine], samples: &[QuerySample]) -> String {
    let mut out = Vec::new();
    // Writing to a Vec cannot fail
    let _ = write_summary(&mut out, buffer, lines, samples);
    String::from_utf8_lossy(&out).into_owned()
}
