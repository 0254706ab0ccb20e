use std::future::Future;
use std::io::Write;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

use super::ServiceError;
use crate::debug;
use crate::parser::model::{LogLine, QuerySample};

/// One flushed, classified and redacted batch for a server.
#[derive(Debug, Clone, Default)]
pub struct LogBatch {
    pub server: String,
    /// Redacted buffer the line offsets point into
    pub buffer: Bytes,
    pub lines: Vec<LogLine>,
    pub samples: Vec<QuerySample>,
}

/// Where flushed batches go.
pub trait LogSink: Send + Sync + 'static {
    fn send(&self, batch: LogBatch) -> impl Future<Output = Result<(), ServiceError>> + Send;
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Record<'a> {
    LogLine { server: &'a str, line: &'a LogLine },
    QuerySample { server: &'a str, sample: &'a QuerySample },
}

/// Writes every line and sample as one JSON object per line.
pub struct JsonSink<W> {
    out: Mutex<W>,
}

impl<W: Write + Send + 'static> JsonSink<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    fn write_batch(&self, batch: &LogBatch) -> Result<(), ServiceError> {
        let mut out = self.out.lock();
        let server = batch.server.as_str();
        for line in &batch.lines {
            serde_json::to_writer(&mut *out, &Record::LogLine { server, line }).map_err(std::io::Error::from)?;
            out.write_all(b"\n")?;
        }
        for sample in &batch.samples {
            serde_json::to_writer(&mut *out, &Record::QuerySample { server, sample })
                .map_err(std::io::Error::from)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
        Ok(())
    }
}

impl<W: Write + Send + 'static> LogSink for JsonSink<W> {
    async fn send(&self, batch: LogBatch) -> Result<(), ServiceError> {
        self.write_batch(&batch)
    }
}

/// Prints a classification summary per batch instead of handing it off.
pub struct SummarySink<W> {
    out: Mutex<W>,
}

impl<W: Write + Send + 'static> SummarySink<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl<W: Write + Send + 'static> LogSink for SummarySink<W> {
    async fn send(&self, batch: LogBatch) -> Result<(), ServiceError> {
        let buffer = String::from_utf8_lossy(&batch.buffer);
        let mut out = self.out.lock();
        writeln!(out, "Would have sent log batch for {}:", batch.server)?;
        debug::write_summary(&mut *out, &buffer, &batch.lines, &batch.samples)?;
        out.flush()?;
        Ok(())
    }
}

/// Forwards batches to an in-process consumer.
pub struct ChannelSink {
    tx: mpsc::Sender<LogBatch>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<LogBatch>) -> Self {
        Self { tx }
    }
}

impl LogSink for ChannelSink {
    async fn send(&self, batch: LogBatch) -> Result<(), ServiceError> {
        self.tx
            .send(batch)
            .await
            .map_err(|_| ServiceError::Sink("batch receiver dropped".to_string()))
    }
}
