//! Pluggable message sink for user-visible diagnostics.
//!
//! Pipeline code reports info, warnings and errors through a [`LogSink`] held
//! in its context rather than through a process-wide logger. The default
//! [`TracingSink`] forwards to `tracing`; [`init_stderr_subscriber`] installs a
//! subscriber that prints those events on standard error.

use std::fmt;
use std::sync::Mutex;

/// Severity of a sink message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => f.write_str("info"),
            Self::Warn => f.write_str("warn"),
            Self::Error => f.write_str("error"),
        }
    }
}

/// Receiver for diagnostics emitted by the pipeline.
pub trait LogSink: Send + Sync + fmt::Debug {
    /// Records one message.
    fn log(&self, level: Level, message: &str);

    /// Records an informational message.
    fn info(&self, message: &str) {
        self.log(Level::Info, message);
    }

    /// Records a recoverable problem.
    fn warn(&self, message: &str) {
        self.log(Level::Warn, message);
    }

    /// Records a failure.
    fn error(&self, message: &str) {
        self.log(Level::Error, message);
    }
}

/// Forwards every message to a `tracing` event of the matching level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: Level, message: &str) {
        match level {
            Level::Info => tracing::info!(target: "jarsmith", "{message}"),
            Level::Warn => tracing::warn!(target: "jarsmith", "{message}"),
            Level::Error => tracing::error!(target: "jarsmith", "{message}"),
        }
    }
}

/// Drops every message.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentSink;

impl LogSink for SilentSink {
    fn log(&self, _level: Level, _message: &str) {}
}

/// Keeps every message in memory, in arrival order.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<(Level, String)>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything recorded so far.
    pub fn records(&self) -> Vec<(Level, String)> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Returns the messages recorded at `level`.
    pub fn messages(&self, level: Level) -> Vec<String> {
        self.records()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m)
            .collect()
    }
}

impl LogSink for MemorySink {
    fn log(&self, level: Level, message: &str) {
        let mut records = match self.records.lock() {
            Ok(records) => records,
            Err(poisoned) => poisoned.into_inner(),
        };
        records.push((level, message.to_string()));
    }
}

/// Installs a `tracing-subscriber` fmt layer writing to standard error.
///
/// Honors `RUST_LOG` through an `EnvFilter`, defaulting to `info`. Returns
/// `false` when a global subscriber was already installed.
pub fn init_stderr_subscriber() -> bool {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
