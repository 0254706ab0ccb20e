use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::parser::model::{LogLine, QuerySample};
use crate::parser::ParseOutcome;
use crate::classify::LogClassification;

/// Keeps each counter group on its own cache line; the reader task and the
/// pipeline task update different groups concurrently.
#[repr(align(64))]
#[derive(Debug, Default)]
pub struct CacheAligned<T>(pub T);

/// Reader-side counters, updated once per physical line.
#[derive(Debug, Default)]
pub struct ReadMetrics {
    pub lines: AtomicU64,
    pub continuations: AtomicU64,
    pub errors: AtomicU64,
}

/// Assembler-side counters, updated once per batch.
#[derive(Debug, Default)]
pub struct BatchMetrics {
    pub batches: AtomicU64,
    pub classified: AtomicU64,
    pub unclassified: AtomicU64,
    pub samples: AtomicU64,
    pub deferred: AtomicU64,
}

/// Pipeline counters.
///
/// All operations use `Ordering::Relaxed`. A snapshot is not transactional
/// across fields, which is fine for diagnostics.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    pub read: CacheAligned<ReadMetrics>,
    pub batch: CacheAligned<BatchMetrics>,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one physical line handed to the parser
    #[inline]
    pub fn record_parse(&self, outcome: &ParseOutcome) {
        self.read.0.lines.fetch_add(1, Ordering::Relaxed);
        if !outcome.is_line() {
            self.read.0.continuations.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_read_error(&self) {
        self.read.0.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of one assembler run.
    pub fn record_batch(&self, lines: &[LogLine], samples: &[QuerySample], deferred: usize) {
        let (unclassified, classified) = lines
            .iter()
            .filter(|l| l.is_top_level())
            .fold((0, 0), |(u, c), l| {
                if l.classification == LogClassification::Unknown {
                    (u + 1, c)
                } else {
                    (u, c + 1)
                }
            });

        let batch = &self.batch.0;
        batch.batches.fetch_add(1, Ordering::Relaxed);
        batch.classified.fetch_add(classified, Ordering::Relaxed);
        batch.unclassified.fetch_add(unclassified, Ordering::Relaxed);
        batch.samples.fetch_add(samples.len() as u64, Ordering::Relaxed);
        batch.deferred.fetch_add(deferred as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let read = &self.read.0;
        let batch = &self.batch.0;
        MetricsSnapshot {
            lines_parsed: read.lines.load(Ordering::Relaxed),
            continuations: read.continuations.load(Ordering::Relaxed),
            read_errors: read.errors.load(Ordering::Relaxed),
            batches: batch.batches.load(Ordering::Relaxed),
            classified: batch.classified.load(Ordering::Relaxed),
            unclassified: batch.unclassified.load(Ordering::Relaxed),
            samples: batch.samples.load(Ordering::Relaxed),
            deferred: batch.deferred.load(Ordering::Relaxed),
        }
    }
}

/// A read-only copy of the pipeline counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub lines_parsed: u64,
    pub continuations: u64,
    pub read_errors: u64,
    pub batches: u64,
    pub classified: u64,
    pub unclassified: u64,
    pub samples: u64,
    pub deferred: u64,
}

impl MetricsSnapshot {
    /// Share of top-level lines that matched a rule
    pub fn classified_rate(&self) -> f64 {
        let total = self.classified + self.unclassified;
        if total == 0 {
            1.0
        } else {
            self.classified as f64 / total as f64
        }
    }
}
