use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;

use super::traits::{LineParser, LogFormat, ParseOutcome};

/// The active parser for one server.
///
/// Settings changes swap in a whole new parser under the write lock; readers
/// clone the `Arc` under the read lock and never see a half-built parser.
pub struct ParserCell {
    parser: RwLock<Arc<dyn LineParser>>,
}

impl ParserCell {
    pub fn new(parser: Arc<dyn LineParser>) -> Self {
        Self {
            parser: RwLock::new(parser),
        }
    }

    pub fn current(&self) -> Arc<dyn LineParser> {
        self.parser.read().clone()
    }

    pub fn replace(&self, parser: Arc<dyn LineParser>) {
        *self.parser.write() = parser;
    }

    pub fn parse_line(&self, line: &str) -> ParseOutcome {
        self.parser.read().parse_line(line)
    }

    pub fn format(&self) -> LogFormat {
        self.parser.read().format()
    }
}

/// Per-server parser registry
///
/// Keyed by server name. Cells are handed out as `Arc`s so a reader task
/// keeps working against its cell while the registry is updated.
pub struct ParserRegistry {
    cells: DashMap<String, Arc<ParserCell>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self {
            cells: DashMap::new(),
        }
    }

    /// Get the parser cell for a server
    pub fn get(&self, server: &str) -> Option<Arc<ParserCell>> {
        self.cells.get(server).map(|r| Arc::clone(r.value()))
    }

    /// Install a parser for a server, replacing any existing one in place
    pub fn set(&self, server: &str, parser: Arc<dyn LineParser>) -> Arc<ParserCell> {
        match self.cells.entry(server.to_string()) {
            Entry::Occupied(entry) => {
                entry.get().replace(parser);
                Arc::clone(entry.get())
            }
            Entry::Vacant(entry) => Arc::clone(entry.insert(Arc::new(ParserCell::new(parser))).value()),
        }
    }

    /// Remove a server from the registry
    pub fn remove(&self, server: &str) {
        self.cells.remove(server);
    }

    pub fn clear(&self) {
        self.cells.clear();
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Get statistics about the registry
    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats::default();

        for entry in self.cells.iter() {
            stats.total_servers += 1;
            match entry.value().format() {
                LogFormat::Prefix => stats.prefix_servers += 1,
                LogFormat::Syslog => stats.syslog_servers += 1,
                LogFormat::HerokuDrain => stats.heroku_servers += 1,
                LogFormat::Unknown => stats.unknown_servers += 1,
            }
        }

        stats
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry statistics
#[derive(Debug, Clone, Default)]
pub struct RegistryStats {
    pub total_servers: usize,
    pub prefix_servers: usize,
    pub syslog_servers: usize,
    pub heroku_servers: usize,
    pub unknown_servers: usize,
}
