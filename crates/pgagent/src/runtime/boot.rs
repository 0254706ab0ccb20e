//! Boot: logging init and per-server pipeline spawn.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono_tz::Tz;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::conf::{AgentConfig, ServerConfig};
use crate::parser::detector::{parser_for, FormatDetectorOrchestrator};
use crate::parser::formats::{PrefixParser, SyslogParser};
use crate::parser::LineParser;
use crate::redact::parse_filter;
use crate::service::{LogReader, LogSink, Pipeline, ServiceError};
use crate::state::{AgentState, SharedState};

/// Lines buffered between a reader and its pipeline
const LINE_CHANNEL_CAPACITY: usize = 4096;

/// Initialise the tracing / logging subsystem.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pgagent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Builds the line parser a server's settings ask for.
///
/// Syslog wins over a prefix. Without either, the format is detected from
/// `sample`, a handful of lines from the start of the log.
pub fn server_parser(server: &ServerConfig, sample: &[&str]) -> Result<Arc<dyn LineParser>, ServiceError> {
    let tz: Option<Tz> = server.timezone().map_err(|_| ServiceError::UnknownFormat(server.name.clone()))?;

    if server.log_syslog {
        return Ok(Arc::new(SyslogParser::new(tz)));
    }
    if !server.log_line_prefix.is_empty() {
        return Ok(Arc::new(PrefixParser::new(&server.log_line_prefix, tz)));
    }

    let detected = FormatDetectorOrchestrator::new().detect_adaptive(sample);
    info!(
        server = %server.name,
        format = detected.format.as_str(),
        template = detected.template.as_deref().unwrap_or(""),
        confidence = detected.confidence,
        "detected log format"
    );
    parser_for(&detected, tz).ok_or_else(|| ServiceError::UnknownFormat(server.name.clone()))
}

/// First lines of a log file, for format detection.
pub async fn read_sample(path: impl AsRef<Path>, limit: usize) -> Result<Vec<String>, ServiceError> {
    let file = tokio::fs::File::open(path).await?;
    let mut lines = BufReader::new(file).lines();
    let mut sample = Vec::with_capacity(limit);
    while sample.len() < limit {
        match lines.next_line().await? {
            Some(line) => sample.push(line),
            None => break,
        }
    }
    Ok(sample)
}

/// Build shared state, install a parser per server and spawn each
/// server's reader and pipeline.
///
/// A server whose parser cannot be set up is skipped with an error; the
/// others still start.
pub async fn boot<S: LogSink>(
    config: AgentConfig,
    sink: Arc<S>,
) -> Result<(SharedState, Vec<JoinHandle<()>>), ServiceError> {
    info!("Starting pgagent v{}", env!("CARGO_PKG_VERSION"));
    let state = Arc::new(AgentState::new(config));
    let mut tasks = Vec::new();

    if state.config.servers.is_empty() {
        warn!("No servers configured, nothing to collect");
    }

    for server in state.config.servers.clone() {
        match start_server(&state, &server, Arc::clone(&sink)).await {
            Ok(handles) => tasks.extend(handles),
            Err(e) => error!(server = %server.name, "Failed to start log collection: {}", e),
        }
    }

    Ok((state, tasks))
}

async fn start_server<S: LogSink>(
    state: &SharedState,
    server: &ServerConfig,
    sink: Arc<S>,
) -> Result<Vec<JoinHandle<()>>, ServiceError> {
    let sample = if server.log_line_prefix.is_empty() && !server.log_syslog {
        read_sample(&server.log_location, crate::parser::ADAPTIVE_REFINEMENT_SIZE).await?
    } else {
        Vec::new()
    };
    let sample: Vec<&str> = sample.iter().map(String::as_str).collect();
    let cell = state.parsers.set(&server.name, server_parser(server, &sample)?);

    let filter = parse_filter(state.config.filter_for(server));
    info!(
        server = %server.name,
        path = %server.log_location,
        filter = ?filter,
        "Starting log collection"
    );

    let (tx, rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
    let reader = LogReader::new(&server.name, cell, Arc::clone(&state.metrics), tx);
    let pipeline = Pipeline::new(
        &server.name,
        rx,
        sink,
        filter,
        Arc::clone(&state.metrics),
        Duration::from_millis(state.config.flush_interval_ms),
    );

    let token = state.shutdown.child_token();
    let path = server.log_location.clone().into();
    let name = server.name.clone();
    let reader_task = tokio::spawn(async move {
        if let Err(e) = reader.tail_file(path, token).await {
            error!(server = %name, "Log reader stopped: {}", e);
        }
    });
    let pipeline_task = tokio::spawn(pipeline.run(state.shutdown.child_token()));

    Ok(vec![reader_task, pipeline_task])
}
