use chrono::{DateTime, Utc};

use crate::classify::analyze_lines;
use crate::parser::model::{LogLine, QuerySample};
use crate::parser::{LineParser, ParseOutcome};

/// Classified contents of a raw log buffer.
#[derive(Debug, Default)]
pub struct BufferAnalysis {
    pub lines: Vec<LogLine>,
    pub samples: Vec<QuerySample>,
    /// Offset just past the consumed buffer, for the next read
    pub next_byte_start: usize,
}

/// Parses a raw buffer line by line and classifies the result.
///
/// Byte offsets start at `initial_byte_start`. Lines that occurred before
/// `cutoff` are skipped; lines whose timestamp could not be resolved are
/// always kept. A physical line the parser does not recognise extends the
/// previous logical line.
pub fn parse_and_analyze_buffer(
    buffer: &str,
    initial_byte_start: usize,
    cutoff: Option<DateTime<Utc>>,
    parser: &dyn LineParser,
) -> BufferAnalysis {
    let mut lines: Vec<LogLine> = Vec::new();
    let mut byte_start = initial_byte_start;
    // Continuations of a skipped line must not attach to an earlier one
    let mut skipping = false;

    for physical in buffer.split_inclusive('\n') {
        let line_start = byte_start;
        byte_start += physical.len();

        match parser.parse_line(physical) {
            ParseOutcome::Continuation(_) => {
                if skipping {
                    continue;
                }
                // Whole physical line, transport wrapper included, so the
                // content is exactly the buffer span it is indexed by
                if let Some(prev) = lines.last_mut() {
                    prev.content.push_str(physical);
                    prev.byte_end += physical.len();
                }
            }
            ParseOutcome::Line(mut line) => {
                skipping = matches!((line.occurred_at, cutoff), (Some(at), Some(cut)) if at < cut);
                if skipping {
                    continue;
                }
                line.byte_start = line_start;
                line.byte_content_start = line_start + physical.len().saturating_sub(line.content.len());
                line.byte_end = line_start + physical.len();
                lines.push(line);
            }
        }
    }

    tracing::debug!(lines = lines.len(), bytes = byte_start - initial_byte_start, "parsed buffer");
    let (lines, samples) = analyze_lines(lines);
    BufferAnalysis {
        lines,
        samples,
        next_byte_start: byte_start,
    }
}
