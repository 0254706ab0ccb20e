use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::conf::AgentConfig;
use crate::parser::cache::ParserRegistry;
use crate::stream::PipelineMetrics;

pub struct AgentState {
    pub config: AgentConfig,
    /// Active parser per server name
    pub parsers: ParserRegistry,
    pub metrics: Arc<PipelineMetrics>,
    /// Cancelled once on shutdown; every reader and pipeline watches it
    pub shutdown: CancellationToken,
}

impl AgentState {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            parsers: ParserRegistry::new(),
            metrics: Arc::new(PipelineMetrics::new()),
            shutdown: CancellationToken::new(),
        }
    }
}

pub type SharedState = Arc<AgentState>;
