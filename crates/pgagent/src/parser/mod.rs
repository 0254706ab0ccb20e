/// Postgres log line parsing
///
/// This module turns raw physical lines into `LogLine` records using the
/// server's `log_line_prefix`, or one of the fixed transport grammars.
///
/// # Architecture
///
/// - `traits.rs`: Core traits for detectors and line parsers
/// - `prefix.rs`: `log_line_prefix` compiler and the supported template table
/// - `time.rs`: Timestamp resolution against offsets and configured zones
/// - `formats/`: Line parser implementations (prefix, syslog, Heroku drain)
/// - `detector.rs`: Prefix auto-detection over sampled lines
/// - `cache.rs`: Per-server parser cells, replaced wholesale on settings change
///
/// # Continuations
///
/// A line that does not match the active grammar is not an error. It is
/// returned as `ParseOutcome::Continuation` and stitched onto the previous
/// logical line by the stream assembler.

pub mod traits;
pub mod detector;
pub mod cache;
pub mod formats;
pub mod model;
pub mod prefix;
pub mod time;

// Re-export commonly used types
pub use traits::{FormatDetector, LineParser};
pub use model::{LogFormat, LogLevel, LogLine, ParseOutcome, SecretKind, SecretMarker};

// Constants
pub const MAX_LINE_SIZE: usize = 1_048_576; // 1MB
pub const DETECTION_SAMPLE_SIZE: usize = 5; // Lines to sample for detection
pub const HIGH_CONFIDENCE_THRESHOLD: f32 = 0.95;
pub const ADAPTIVE_REFINEMENT_SIZE: usize = 20;
