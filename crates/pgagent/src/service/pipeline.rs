use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::sink::{LogBatch, LogSink};
use crate::parser::model::{LogLine, SecretKind};
use crate::redact::redact_buffer;
use crate::stream::{analyze_stream, PipelineMetrics, GRACE_PERIOD};

/// Log a metrics line every this many flushes
const METRICS_LOG_EVERY: u64 = 60;

/// Periodic flush loop for one server.
///
/// Collects lines from the reader, runs the stream assembler on every tick
/// and hands classified, redacted batches to the sink. Lines still inside
/// the grace period are carried over to the next tick.
pub struct Pipeline<S> {
    server: String,
    rx: mpsc::Receiver<LogLine>,
    sink: Arc<S>,
    filter: Vec<SecretKind>,
    metrics: Arc<PipelineMetrics>,
    interval: Duration,
    deferred: Vec<LogLine>,
}

impl<S: LogSink> Pipeline<S> {
    pub fn new(
        server: &str,
        rx: mpsc::Receiver<LogLine>,
        sink: Arc<S>,
        filter: Vec<SecretKind>,
        metrics: Arc<PipelineMetrics>,
        interval: Duration,
    ) -> Self {
        Self {
            server: server.to_string(),
            rx,
            sink,
            filter,
            metrics,
            interval,
            deferred: Vec::new(),
        }
    }

    /// Runs until cancelled or until the reader has gone away and every
    /// collected line has been flushed.
    ///
    /// Cancellation is checked between batches only; a batch that has
    /// started is always finished.
    pub async fn run(mut self, token: CancellationToken) {
        info!(server = %self.server, interval_ms = self.interval.as_millis() as u64, "starting log pipeline");

        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut flushes: u64 = 0;

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!(server = %self.server, "log pipeline cancelled");
                    break;
                }
                _ = interval.tick() => {}
            }

            let closed = self.drain();
            // Nothing more can arrive, so nothing is worth waiting for
            let now = if closed { Utc::now() + GRACE_PERIOD + TimeDelta::seconds(1) } else { Utc::now() };
            self.flush(now).await;

            flushes = flushes.saturating_add(1);
            if flushes % METRICS_LOG_EVERY == 0 {
                let snap = self.metrics.snapshot();
                info!(
                    server = %self.server,
                    lines = snap.lines_parsed,
                    batches = snap.batches,
                    classified = snap.classified,
                    unclassified = snap.unclassified,
                    samples = snap.samples,
                    "pipeline counters"
                );
            }

            if closed && self.deferred.is_empty() {
                info!(server = %self.server, "log source closed, stopping pipeline");
                break;
            }
        }
    }

    /// Moves everything waiting in the channel into the deferred set.
    /// Returns `true` once the channel is closed and empty.
    fn drain(&mut self) -> bool {
        loop {
            match self.rx.try_recv() {
                Ok(line) => self.deferred.push(line),
                Err(mpsc::error::TryRecvError::Empty) => return false,
                Err(mpsc::error::TryRecvError::Disconnected) => return true,
            }
        }
    }

    async fn flush(&mut self, now: DateTime<Utc>) {
        if self.deferred.is_empty() {
            return;
        }
        let lines = std::mem::take(&mut self.deferred);
        let batch = analyze_stream(lines, now);
        self.deferred = batch.deferred;
        self.metrics.record_batch(&batch.lines, &batch.samples, self.deferred.len());
        if batch.lines.is_empty() && batch.samples.is_empty() {
            return;
        }

        let redacted = redact_buffer(batch.buffer.as_bytes(), &batch.lines, &self.filter);
        let mut lines = batch.lines;
        if !self.filter.is_empty() {
            apply_redacted_content(&mut lines, &redacted);
        }

        let out = LogBatch {
            server: self.server.clone(),
            buffer: Bytes::from(redacted),
            lines,
            samples: batch.samples,
        };
        if let Err(e) = self.sink.send(out).await {
            error!(server = %self.server, "failed to hand off log batch: {}", e);
        }
    }
}

/// Replaces each line's content with its span of the redacted buffer.
fn apply_redacted_content(lines: &mut [LogLine], redacted: &[u8]) {
    for line in lines {
        if let Some(span) = redacted.get(line.byte_content_start..line.byte_end) {
            line.content = String::from_utf8_lossy(span).into_owned();
        }
    }
}
