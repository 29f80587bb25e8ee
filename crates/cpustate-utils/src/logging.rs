//! # Logging Utilities
//!
//! Logging infrastructure for cpustate using `tracing`.
//!
//! The register model logs at two levels:
//! - `debug`: a snapshot was loaded into or projected out of the state
//! - `trace`: a single register was written by name
//!
//! Both are off at the default `info` level, so a debugger only pays for
//! them when asked to.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cpustate_utils::init_logging;
//!
//! // Keep the guard alive for as long as file logging should run
//! let _guard = init_logging().expect("Failed to initialize logging");
//!
//! tracing::info!("tracer attached");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Log level filter (e.g. `RUST_LOG=cpustate_core=trace`)
//! - `CPUSTATE_LOG_FORMAT`: Output format (`json` or `pretty`, default: `pretty`)
//! - `CPUSTATE_LOG_FILE`: Optional log file, or a directory to hold
//!   `YYYY-MM-DD-cpustate.log` named after the startup date. Events are
//!   appended to exactly that file.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, io};

use chrono::Utc;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Environment variable selecting the output format
pub const LOG_FORMAT_ENV: &str = "CPUSTATE_LOG_FORMAT";
/// Environment variable naming the log file or directory
pub const LOG_FILE_ENV: &str = "CPUSTATE_LOG_FILE";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat
{
    /// Human-readable output (default)
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "dev" | "text" => Ok(LogFormat::Pretty),
            "json" | "prod" => Ok(LogFormat::Json),
            _ => Err(LoggingError::InvalidFormat(s.to_string())),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" | "err" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "dbg" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(LoggingError::InvalidLevel(s.to_string())),
        }
    }
}

/// Keeps the background file writer running
///
/// Dropping the guard flushes and stops file logging. Console logging is
/// unaffected.
#[must_use = "dropping the guard stops file logging"]
#[derive(Debug, Default)]
pub struct LogGuard
{
    file: Option<WorkerGuard>,
    path: Option<PathBuf>,
}

impl LogGuard
{
    /// The log file being written, if file logging is on.
    #[must_use]
    pub fn path(&self) -> Option<&Path>
    {
        self.path.as_deref()
    }

    /// Whether events are also written to a file.
    #[must_use]
    pub const fn has_file(&self) -> bool
    {
        self.file.is_some()
    }
}

/// Initialize logging from the environment
///
/// Reads `RUST_LOG`, `CPUSTATE_LOG_FORMAT` and `CPUSTATE_LOG_FILE`. An
/// unparsable format falls back to pretty output.
///
/// ## Errors
///
/// Returns an error if a global subscriber is already installed or the log
/// directory cannot be created.
pub fn init_logging() -> Result<LogGuard, LoggingError>
{
    let format = env::var(LOG_FORMAT_ENV)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_default();

    init_with(format, Level::INFO)
}

/// Initialize logging with an explicit default level and format
///
/// `RUST_LOG` still wins when set, so per-module filters keep working.
///
/// ## Example
///
/// ```rust,no_run
/// use cpustate_utils::{init_logging_with_level, LogFormat, LogLevel};
///
/// let _guard = init_logging_with_level(LogLevel::Debug, LogFormat::Json)
///     .expect("Failed to initialize logging");
/// ```
///
/// ## Errors
///
/// Returns an error if a global subscriber is already installed or the log
/// directory cannot be created.
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<LogGuard, LoggingError>
{
    init_with(format, level.into())
}

/// Route `tracing` output to the test harness
///
/// Safe to call from every test: only the first call installs a subscriber.
/// Output is captured per test and shown for failures, filtered by
/// `RUST_LOG` (default `debug`).
pub fn init_test_logging()
{
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::DEBUG.to_string()));
    let _ = fmt::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .with_timer(ChronoUtc::rfc_3339())
        .try_init();
}

fn env_filter(default_level: Level) -> EnvFilter
{
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level.to_string()))
}

/// Resolve `CPUSTATE_LOG_FILE`: a directory gets a dated file name.
fn resolve_log_file(raw: &str) -> Result<PathBuf, LoggingError>
{
    let path = PathBuf::from(raw);
    if raw.ends_with('/') || path.is_dir() {
        std::fs::create_dir_all(&path)?;
        let today = Utc::now().format("%Y-%m-%d");
        return Ok(path.join(format!("{today}-cpustate.log")));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(path)
}

fn console_layer(format: LogFormat, filter: EnvFilter) -> BoxedLayer
{
    let layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_writer(io::stderr);

    match format {
        LogFormat::Pretty => layer.with_ansi(true).with_filter(filter).boxed(),
        LogFormat::Json => layer
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_filter(filter)
            .boxed(),
    }
}

fn file_layer(format: LogFormat, filter: EnvFilter, path: &Path) -> (BoxedLayer, WorkerGuard)
{
    // Name is final, no date suffix
    let appender = tracing_appender::rolling::never(
        path.parent().unwrap_or_else(|| Path::new(".")),
        path.file_name().unwrap_or_default(),
    );
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let layer = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_ansi(false);

    let layer = match format {
        LogFormat::Pretty => layer.with_filter(filter).boxed(),
        LogFormat::Json => layer.json().with_filter(filter).boxed(),
    };
    (layer, guard)
}

fn init_with(format: LogFormat, default_level: Level) -> Result<LogGuard, LoggingError>
{
    let mut layers = vec![console_layer(format, env_filter(default_level))];
    let mut guard = LogGuard::default();

    if let Ok(raw) = env::var(LOG_FILE_ENV) {
        let path = resolve_log_file(&raw)?;
        let (layer, worker) = file_layer(format, env_filter(default_level), &path);
        layers.push(layer);
        guard.file = Some(worker);
        guard.path = Some(path);
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| LoggingError::InitializationFailed(e.to_string()))?;

    tracing::debug!(?format, file = ?guard.path, "logging initialized");
    Ok(guard)
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// Invalid log format
    #[error("Invalid log format: {0}. Use 'pretty' or 'json'")]
    InvalidFormat(String),

    /// Invalid log level
    #[error("Invalid log level: {0}. Use 'error', 'warn', 'info', 'debug', or 'trace'")]
    InvalidLevel(String),

    /// A global subscriber was already installed
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// Log directory could not be created
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_log_format_from_str()
    {
        assert_eq!(LogFormat::from_str("pretty").unwrap(), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("JSON").unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::from_str("text").unwrap(), LogFormat::Pretty);
        assert!(matches!(
            LogFormat::from_str("xml"),
            Err(LoggingError::InvalidFormat(s)) if s == "xml"
        ));
    }

    #[test]
    fn test_log_level_from_str()
    {
        assert_eq!(LogLevel::from_str("error").unwrap(), LogLevel::Error);
        assert_eq!(LogLevel::from_str("warning").unwrap(), LogLevel::Warn);
        assert_eq!(LogLevel::from_str("info").unwrap(), LogLevel::Info);
        assert_eq!(LogLevel::from_str("dbg").unwrap(), LogLevel::Debug);
        assert_eq!(LogLevel::from_str("trace").unwrap(), LogLevel::Trace);
        assert!(LogLevel::from_str("loud").is_err());
    }

    #[test]
    fn test_log_level_to_tracing_level()
    {
        assert_eq!(Level::from(LogLevel::Error), Level::ERROR);
        assert_eq!(Level::from(LogLevel::Debug), Level::DEBUG);
        assert_eq!(Level::from(LogLevel::Trace), Level::TRACE);
    }

    #[test]
    fn test_resolve_log_file_in_directory()
    {
        let dir = env::temp_dir().join("cpustate-log-test");
        let raw = format!("{}/", dir.display());
        let path = resolve_log_file(&raw).unwrap();

        assert_eq!(path.parent(), Some(dir.as_path()));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.ends_with("-cpustate.log"));
        assert!(name.starts_with(&Utc::now().format("%Y").to_string()));
    }

    #[test]
    fn test_file_layer_writes_to_reported_path()
    {
        let dir = env::temp_dir().join(format!("cpustate-file-layer-{}", std::process::id()));
        let path = resolve_log_file(&format!("{}/", dir.display())).unwrap();
        let _ = std::fs::remove_file(&path);

        let (layer, guard) = file_layer(LogFormat::Json, EnvFilter::new("info"), &path);
        let subscriber = Registry::default().with(vec![layer]);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "cpustate", "file layer check");
        });
        drop(guard);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("file layer check"));
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_init_test_logging_is_idempotent()
    {
        init_test_logging();
        init_test_logging();
        tracing::debug!("still alive");
    }
}
