use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use pgagent::conf::{AgentConfig, ServerConfig};
use pgagent::debug::write_summary;
use pgagent::parser::prefix::{is_supported_prefix, validate_prefix, CompiledPrefix};
use pgagent::redact::{parse_filter, redact_buffer};
use pgagent::runtime::boot;
use pgagent::service::{JsonSink, LogSink, SummarySink};
use pgagent::stream::parse_and_analyze_buffer;

#[derive(Parser)]
#[command(name = "pgagent")]
#[command(version)]
#[command(about = "Postgres log collection and classification agent")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Tail the configured servers' logs (the default)
    Run {
        /// Config file; defaults to PGAGENT_CONFIG_FILE or /etc/pgagent/agent.toml
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Classify a log file and print a summary with all unclassified lines
    Debug {
        #[command(flatten)]
        source: LogFileArgs,
    },
    /// Print a log file with the selected secrets replaced
    Redact {
        #[command(flatten)]
        source: LogFileArgs,
        /// Secret kinds to replace: none, all, or a comma list
        #[arg(long, default_value = "all")]
        filter: String,
    },
    /// Check a log_line_prefix against the supported set
    CheckPrefix {
        template: String,
    },
}

#[derive(clap::Args)]
struct LogFileArgs {
    /// Log file to read
    file: PathBuf,
    /// log_line_prefix the file was written with; detected when omitted
    #[arg(long, env = "PGAGENT_LOG_LINE_PREFIX", default_value = "")]
    prefix: String,
    /// Time zone for prefix timestamps without an offset
    #[arg(long, env = "PGAGENT_LOG_TIMEZONE")]
    timezone: Option<String>,
    /// The file is syslog output
    #[arg(long)]
    syslog: bool,
}

impl LogFileArgs {
    /// Reads the file and classifies every line in it.
    fn analyze(&self) -> Result<(String, pgagent::stream::BufferAnalysis)> {
        let buffer = std::fs::read_to_string(&self.file)
            .with_context(|| format!("Failed to read {}", self.file.display()))?;
        let server = ServerConfig {
            name: self.file.display().to_string(),
            log_location: self.file.display().to_string(),
            log_line_prefix: self.prefix.clone(),
            log_timezone: self.timezone.clone(),
            log_syslog: self.syslog,
            ..Default::default()
        };
        let sample: Vec<&str> = buffer.lines().take(pgagent::parser::ADAPTIVE_REFINEMENT_SIZE).collect();
        let parser = boot::server_parser(&server, &sample).context("No usable log parser")?;
        let analysis = parse_and_analyze_buffer(&buffer, 0, None, parser.as_ref());
        Ok((buffer, analysis))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    boot::init_logging();

    match cli.command.unwrap_or(Command::Run { config: None }) {
        Command::Run { config } => run(config).await,
        Command::Debug { source } => {
            let (buffer, analysis) = source.analyze()?;
            let mut out = std::io::stdout().lock();
            write_summary(&mut out, &buffer, &analysis.lines, &analysis.samples)?;
            Ok(())
        }
        Command::Redact { source, filter } => {
            use std::io::Write;

            let (buffer, analysis) = source.analyze()?;
            let redacted = redact_buffer(buffer.as_bytes(), &analysis.lines, &parse_filter(&filter));
            std::io::stdout().lock().write_all(&redacted)?;
            Ok(())
        }
        Command::CheckPrefix { template } => check_prefix(&template),
    }
}

async fn run(config_path: Option<PathBuf>) -> Result<()> {
    let config = match config_path {
        Some(path) => AgentConfig::load_from(path),
        None => AgentConfig::load(),
    }
    .context("Failed to load configuration")?;

    if config.debug_logs {
        serve(config, SummarySink::new(std::io::stdout())).await
    } else {
        serve(config, JsonSink::new(std::io::stdout())).await
    }
}

async fn serve<S: LogSink>(config: AgentConfig, sink: S) -> Result<()> {
    let (state, tasks) = boot::boot(config, Arc::new(sink)).await?;
    if tasks.is_empty() {
        bail!("No log collection could be started");
    }

    tokio::signal::ctrl_c().await.context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received, stopping log collection");
    state.shutdown.cancel();
    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}

fn check_prefix(template: &str) -> Result<()> {
    let compiled = CompiledPrefix::compile(template);
    if is_supported_prefix(template) {
        println!("{template:?} is a supported log_line_prefix");
    } else {
        println!("{template:?} is not one of the supported log_line_prefix settings");
    }
    match compiled.pattern() {
        Some(pattern) => println!("pattern: {pattern}"),
        None => println!("pattern: (none, every line is a continuation)"),
    }
    if let Err(warning) = validate_prefix(template) {
        println!("warning: {warning}");
    }
    Ok(())
}
