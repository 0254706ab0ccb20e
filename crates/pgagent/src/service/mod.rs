//! Service module: per-server reader and flush pipeline, plus the sink
//! that receives finished batches.

pub mod pipeline;
pub mod reader;
pub mod sink;

pub use pipeline::Pipeline;
pub use reader::LogReader;
pub use sink::{ChannelSink, JsonSink, LogBatch, LogSink, SummarySink};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("log source I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("sink rejected batch: {0}")]
    Sink(String),
    #[error("could not determine the log format for server {0}")]
    UnknownFormat(String),
}
