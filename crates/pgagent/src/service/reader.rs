use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ServiceError;
use crate::parser::cache::ParserCell;
use crate::parser::model::LogLine;
use crate::stream::PipelineMetrics;

/// How long to wait at end of file before looking for new data
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Reads physical lines from a log source, parses them with the server's
/// current parser and forwards them to the pipeline.
///
/// Continuation lines are forwarded too; the assembler stitches them.
pub struct LogReader {
    server: String,
    cell: Arc<ParserCell>,
    metrics: Arc<PipelineMetrics>,
    tx: mpsc::Sender<LogLine>,
}

impl LogReader {
    pub fn new(server: &str, cell: Arc<ParserCell>, metrics: Arc<PipelineMetrics>, tx: mpsc::Sender<LogLine>) -> Self {
        Self {
            server: server.to_string(),
            cell,
            metrics,
            tx,
        }
    }

    /// Follows a log file from its current end until cancelled.
    pub async fn tail_file(self, path: PathBuf, token: CancellationToken) -> Result<(), ServiceError> {
        let mut file = File::open(&path).await?;
        file.seek(SeekFrom::End(0)).await?;
        info!(server = %self.server, path = %path.display(), "tailing log file");
        self.read(BufReader::new(file), true, token).await
    }

    /// Reads `source` line by line.
    ///
    /// With `follow`, end of input is treated as "no data yet" and polled
    /// again; otherwise reading stops there. Returns early on cancellation or
    /// when the pipeline has gone away.
    pub async fn read<R>(&self, mut source: R, follow: bool, token: CancellationToken) -> Result<(), ServiceError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut raw = Vec::new();
        // A partial line at end of input waits for the rest of it
        let mut pending = Vec::new();

        loop {
            raw.clear();
            let read = tokio::select! {
                _ = token.cancelled() => return Ok(()),
                read = source.read_until(b'\n', &mut raw) => read?,
            };

            if read == 0 {
                if !follow {
                    if !pending.is_empty() {
                        let rest = std::mem::take(&mut pending);
                        self.forward(&rest).await?;
                    }
                    return Ok(());
                }
                tokio::select! {
                    _ = token.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(POLL_INTERVAL) => continue,
                }
            }

            pending.extend_from_slice(&raw);
            if follow && !pending.ends_with(b"\n") {
                continue;
            }
            let line = std::mem::take(&mut pending);
            if !self.forward(&line).await? {
                debug!(server = %self.server, "pipeline closed, stopping reader");
                return Ok(());
            }
        }
    }

    /// Parses one physical line and sends it on. Returns `false` once the
    /// receiving side is gone.
    async fn forward(&self, raw: &[u8]) -> Result<bool, ServiceError> {
        let outcome = match self.cell.current().parse_bytes(raw) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.metrics.record_read_error();
                warn!(server = %self.server, "skipping unreadable log line: {}", e);
                return Ok(true);
            }
        };
        self.metrics.record_parse(&outcome);

        let mut line = outcome.into_inner();
        line.collected_at = Some(Utc::now());
        Ok(self.tx.send(line).await.is_ok())
    }
}
