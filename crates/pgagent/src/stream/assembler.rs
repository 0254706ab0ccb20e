use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};

use crate::classify::analyze_lines;
use crate::parser::model::{LogLevel, LogLine, QuerySample};

/// How long a primary line waits for its continuation lines before it is
/// classified.
pub const GRACE_PERIOD: TimeDelta = TimeDelta::seconds(3);

/// Result of one assembler run.
#[derive(Debug, Default)]
pub struct StreamBatch {
    /// Contents of the classified lines, back to back; byte offsets on
    /// `lines` point into this buffer.
    pub buffer: String,
    pub lines: Vec<LogLine>,
    pub samples: Vec<QuerySample>,
    /// Too fresh for this run; pass them back in with the next batch.
    pub deferred: Vec<LogLine>,
}

impl StreamBatch {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty() && self.samples.is_empty()
    }
}

/// Stitches, partitions and classifies a batch of streamed lines.
///
/// Streamed lines lose their raw prefix, so the returned buffer holds only
/// the stitched contents and `byte_start == byte_content_start` for every
/// line.
pub fn analyze_stream(lines: Vec<LogLine>, now: DateTime<Utc>) -> StreamBatch {
    let stitched = sort_stream(stitch_collector_output(lines));
    let (ready, deferred) = partition_ready(stitched, now);
    if ready.is_empty() {
        return StreamBatch {
            deferred,
            ..Default::default()
        };
    }

    let mut analyzable = stitch_backends(ready);
    let buffer = assign_offsets(&mut analyzable);
    let (lines, samples) = analyze_lines(analyzable);

    tracing::debug!(
        lines = lines.len(),
        samples = samples.len(),
        deferred = deferred.len(),
        "assembled stream batch"
    );
    StreamBatch {
        buffer,
        lines,
        samples,
        deferred,
    }
}

/// Sort key: backend pid, log line number, occurrence time, arrival index.
type StreamKey = (i32, i32, Option<DateTime<Utc>>, usize);

/// Orders by backend pid, log line number and occurrence time.
///
/// A line without a line number or timestamp takes them from the line
/// that arrived before it in the same backend, so it stays behind that
/// line. Arrival order breaks the remaining ties.
fn sort_stream(lines: Vec<LogLine>) -> Vec<LogLine> {
    let mut last: HashMap<i32, (i32, Option<DateTime<Utc>>)> = HashMap::new();
    let mut keyed: Vec<(StreamKey, LogLine)> = lines
        .into_iter()
        .enumerate()
        .map(|(idx, line)| {
            let (prev_number, prev_at) = last.get(&line.backend_pid).copied().unwrap_or((0, None));
            let number = if line.log_line_number != 0 {
                line.log_line_number
            } else {
                prev_number
            };
            let at = line.occurred_at.or(prev_at);
            last.insert(line.backend_pid, (number, at));
            ((line.backend_pid, number, at, idx), line)
        })
        .collect();

    keyed.sort_unstable_by(|a, b| a.0.cmp(&b.0));
    keyed.into_iter().map(|(_, line)| line).collect()
}

/// Pass 1: prefixless output without a pid (e.g. from the logging
/// collector process) belongs to whatever arrived right before it.
fn stitch_collector_output(lines: Vec<LogLine>) -> Vec<LogLine> {
    let mut out: Vec<LogLine> = Vec::with_capacity(lines.len());
    for line in lines {
        match out.last_mut() {
            Some(prev) if line.log_level == LogLevel::Unknown && line.backend_pid == 0 => {
                tracing::trace!(bytes = line.content.len(), "stitched collector continuation");
                prev.content.push_str(&line.content);
            }
            _ => out.push(line),
        }
    }
    out
}

/// Pass 2: splits lines into those old enough to classify and those that
/// may still receive continuations.
///
/// A continuation that carries a pid is ready only if it follows a ready
/// primary line of the same backend. Deferred lines are not re-examined for
/// attachment once deferred.
fn partition_ready(lines: Vec<LogLine>, now: DateTime<Utc>) -> (Vec<LogLine>, Vec<LogLine>) {
    let is_fresh = |line: &LogLine| line.collected_at.is_some_and(|at| now - at <= GRACE_PERIOD);

    let mut ready = Vec::new();
    let mut deferred = Vec::new();
    let mut last_ready_pid: Option<i32> = None;

    for line in lines {
        if line.log_level != LogLevel::Unknown {
            if is_fresh(&line) {
                last_ready_pid = None;
                deferred.push(line);
            } else {
                last_ready_pid = Some(line.backend_pid);
                ready.push(line);
            }
        } else if line.backend_pid != 0 {
            if last_ready_pid == Some(line.backend_pid) {
                ready.push(line);
            } else {
                deferred.push(line);
            }
        } else if is_fresh(&line) {
            deferred.push(line);
        } else {
            tracing::debug!(bytes = line.content.len(), "dropping orphaned continuation");
        }
    }

    if !deferred.is_empty() {
        tracing::trace!(count = deferred.len(), "deferred too fresh lines");
    }
    (ready, deferred)
}

/// Pass 3: per backend, folds continuation lines into the preceding line.
///
/// Backends are emitted in order of first appearance. A continuation with
/// nothing before it in its backend is discarded.
fn stitch_backends(ready: Vec<LogLine>) -> Vec<LogLine> {
    let mut order: Vec<i32> = Vec::new();
    let mut backends: HashMap<i32, Vec<LogLine>> = HashMap::new();

    for line in ready {
        let pid = line.backend_pid;
        let backend = backends.entry(pid).or_insert_with(|| {
            order.push(pid);
            Vec::new()
        });
        if line.log_level == LogLevel::Unknown {
            if let Some(prev) = backend.last_mut() {
                prev.content.push_str(&line.content);
            }
            continue;
        }
        backend.push(line);
    }

    order
        .into_iter()
        .filter_map(|pid| backends.remove(&pid))
        .flatten()
        .collect()
}

/// Lays the contents out back to back and points each line at its span.
fn assign_offsets(lines: &mut [LogLine]) -> String {
    let mut buffer = String::with_capacity(lines.iter().map(|l| l.content.len()).sum());
    for line in lines.iter_mut() {
        line.byte_start = buffer.len();
        line.byte_content_start = buffer.len();
        buffer.push_str(&line.content);
        line.byte_end = buffer.len();
    }
    buffer
}
