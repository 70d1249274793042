//! Structured logging for the forecast adapter.
//!
//! All diagnostic output goes through a [`LogSink`] supplied by the host, so
//! the adapter never writes to the console directly. [`Logger`] is the sink
//! used by the binary: it forwards to the `log` facade and can append
//! timestamped entries to a file for daemon operation. [`MemorySink`]
//! captures records for tests and embedding hosts.

use chrono::Utc;
use std::cell::RefCell;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::model::ForecastError;

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warning => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

/// Part of the adapter a log line originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Config,
    Resolver,
    Fetch,
    Host,
    System,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Config => write!(f, "CFG"),
            Component::Resolver => write!(f, "RES"),
            Component::Fetch => write!(f, "API"),
            Component::Host => write!(f, "HOST"),
            Component::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - e.g. the vessel is out of network coverage
    Expected,
    /// Unexpected failure - indicates an API change or a configuration issue
    Unexpected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Sink abstraction
// ---------------------------------------------------------------------------

/// Destination for every diagnostic message the adapter produces.
pub trait LogSink {
    fn log(&self, level: LogLevel, component: Component, message: &str);

    fn debug(&self, component: Component, message: &str) {
        self.log(LogLevel::Debug, component, message);
    }

    fn info(&self, component: Component, message: &str) {
        self.log(LogLevel::Info, component, message);
    }

    fn warn(&self, component: Component, message: &str) {
        self.log(LogLevel::Warning, component, message);
    }

    fn error(&self, component: Component, message: &str) {
        self.log(LogLevel::Error, component, message);
    }
}

// ---------------------------------------------------------------------------
// Logger
// ---------------------------------------------------------------------------

pub struct Logger {
    /// Minimum log level to forward
    min_level: LogLevel,
    /// Optional file path for logging
    log_file: Option<PathBuf>,
}

impl Logger {
    pub fn new(min_level: LogLevel, log_file: Option<&Path>) -> Self {
        Self {
            min_level,
            log_file: log_file.map(Path::to_path_buf),
        }
    }

    fn append_to_file(path: &Path, entry: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", entry)?;
        Ok(())
    }
}

impl LogSink for Logger {
    fn log(&self, level: LogLevel, component: Component, message: &str) {
        if level < self.min_level {
            return;
        }

        log::log!(target: "squid_forecast", log::Level::from(level), "{}: {}", component, message);

        if let Some(ref path) = self.log_file {
            let entry = format!(
                "{} {} {}: {}",
                Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
                level,
                component,
                message
            );
            if let Err(e) = Self::append_to_file(path, &entry) {
                log::error!("Failed to write to log file {}: {}", path.display(), e);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory sink
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub component: Component,
    pub message: String,
}

/// Captures records in memory. Clones share the same buffer, so a test can
/// hand one clone to the orchestrator and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Rc<RefCell<Vec<LogRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.borrow().clone()
    }

    /// True if any captured message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.records.borrow().iter().any(|r| r.message.contains(needle))
    }

    pub fn count_at(&self, level: LogLevel) -> usize {
        self.records.borrow().iter().filter(|r| r.level == level).count()
    }
}

impl LogSink for MemorySink {
    fn log(&self, level: LogLevel, component: Component, message: &str) {
        self.records.borrow_mut().push(LogRecord {
            level,
            component,
            message: message.to_string(),
        });
    }
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify a failed fetch cycle by its error.
pub fn classify_failure(err: &ForecastError) -> FailureType {
    match err {
        // Dropped connections and timeouts are routine at sea
        ForecastError::Transport(msg) if msg.contains("timed out") => FailureType::Expected,
        ForecastError::Transport(_) => FailureType::Unknown,
        // Rejected key, moved endpoint, or a changed response shape
        ForecastError::HttpError(_) | ForecastError::ParseError(_) => FailureType::Unexpected,
        ForecastError::Conversion(_) => FailureType::Unexpected,
    }
}

/// Log a failed cycle with automatic classification
pub fn log_fetch_failure(sink: &dyn LogSink, operation: &str, err: &ForecastError) {
    let failure_type = classify_failure(err);
    let message = format!("{} failed [{}]: {}", operation, failure_type, err);

    match failure_type {
        FailureType::Expected => sink.info(Component::Fetch, &message),
        FailureType::Unexpected => sink.error(Component::Fetch, &message),
        FailureType::Unknown => sink.warn(Component::Fetch, &message),
    }
}
