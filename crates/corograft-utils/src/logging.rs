//! # Logging Utilities
//!
//! Logging infrastructure for corograft using `tracing`.
//!
//! This module provides structured logging with support for:
//! - Pretty (human-readable) or JSON output
//! - Environment variable configuration with CLI overrides
//! - Optional daily-rolled log file next to console output
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use corograft_utils::LoggingConfig;
//!
//! // Reads COROGRAFT_LOG_FORMAT and COROGRAFT_LOG_FILE; RUST_LOG picks the level.
//! // Keep the guard alive until exit so file output gets flushed.
//! let _guard = LoggingConfig::from_env().init().expect("Failed to initialize logging");
//!
//! tracing::info!("Application started");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Log level filter (e.g., `RUST_LOG=debug`, `RUST_LOG=corograft_core=debug`)
//! - `COROGRAFT_LOG_FORMAT`: Output format (`json` or `pretty`, default: `pretty`)
//! - `COROGRAFT_LOG_FILE`: Optional path to a log file (rolled daily)

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, io};

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Environment variable selecting the output format
pub const LOG_FORMAT_ENV: &str = "COROGRAFT_LOG_FORMAT";
/// Environment variable naming an optional log file
pub const LOG_FILE_ENV: &str = "COROGRAFT_LOG_FILE";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat
{
    /// Pretty-printed, human-readable format (default)
    Pretty,
    /// JSON format, one object per line
    Json,
}

impl FromStr for LogFormat
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "dev" | "development" => Ok(LogFormat::Pretty),
            "json" | "prod" | "production" => Ok(LogFormat::Json),
            _ => Err(format!("Unknown log format: {s}. Use 'pretty' or 'json'")),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level (default)
    Info,
    /// Debug level
    Debug,
    /// Trace level (most verbose)
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
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" | "err" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "dbg" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!(
                "Unknown log level: {s}. Use 'error', 'warn', 'info', 'debug', or 'trace'"
            )),
        }
    }
}

/// Resolved logging settings
///
/// Build one with [`LoggingConfig::from_env`], override fields from the
/// command line, then call [`LoggingConfig::init`].
///
/// ## Example
///
/// ```rust,no_run
/// use corograft_utils::{LogLevel, LoggingConfig};
///
/// let mut config = LoggingConfig::from_env();
/// config.level = Some(LogLevel::Debug);
/// let _guard = config.init().expect("Failed to initialize logging");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig
{
    /// Explicit level. `None` defers to `RUST_LOG`, then INFO.
    pub level: Option<LogLevel>,
    /// Output format
    pub format: LogFormat,
    /// Optional log file
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig
{
    fn default() -> Self
    {
        Self {
            level: None,
            format: LogFormat::Pretty,
            file: None,
        }
    }
}

impl LoggingConfig
{
    /// Read `COROGRAFT_LOG_FORMAT` and `COROGRAFT_LOG_FILE`.
    ///
    /// An unknown format falls back to pretty output.
    pub fn from_env() -> Self
    {
        let format = env::var(LOG_FORMAT_ENV)
            .ok()
            .and_then(|s| LogFormat::from_str(&s).ok())
            .unwrap_or(LogFormat::Pretty);
        let file = env::var(LOG_FILE_ENV).ok().filter(|s| !s.is_empty()).map(PathBuf::from);

        Self {
            level: None,
            format,
            file,
        }
    }

    /// Build the level filter
    ///
    /// Priority:
    /// 1. Explicit level (from a `--log-level` CLI flag)
    /// 2. `RUST_LOG` (allows module-specific filters like `corograft_core=debug`)
    /// 3. INFO
    fn filter(&self) -> EnvFilter
    {
        if let Some(level) = self.level {
            EnvFilter::new(Level::from(level).to_string())
        } else {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()))
        }
    }

    /// Install the global subscriber.
    ///
    /// Console output goes to stdout. When a log file is configured, the
    /// returned guard owns its background writer; drop it only at exit.
    ///
    /// ## Errors
    ///
    /// - `LoggingError::FileError`: the log directory could not be created
    /// - `LoggingError::InitializationFailed`: a global subscriber is already set
    pub fn init(self) -> Result<LoggingGuard, LoggingError>
    {
        let filter = self.filter();
        let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
        layers.push(console_layer(self.format).with_filter(filter.clone()).boxed());

        let mut worker = None;
        if let Some(path) = &self.file {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            std::fs::create_dir_all(dir)?;
            let file_name = path
                .file_name()
                .ok_or_else(|| LoggingError::InvalidFile(path.display().to_string()))?;

            let (non_blocking, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, file_name));
            layers.push(file_layer(self.format, non_blocking).with_filter(filter).boxed());
            worker = Some(guard);
        }

        Registry::default()
            .with(layers)
            .try_init()
            .map_err(|e| LoggingError::InitializationFailed(e.to_string()))?;

        Ok(LoggingGuard { _worker: worker })
    }
}

/// Keeps the file writer alive
///
/// Dropping it flushes and stops background file logging.
#[must_use = "dropping the guard stops file logging"]
#[derive(Debug)]
pub struct LoggingGuard
{
    _worker: Option<WorkerGuard>,
}

fn console_layer(format: LogFormat) -> Box<dyn Layer<Registry> + Send + Sync>
{
    match format {
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_ansi(true)
            .with_writer(io::stdout)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(io::stdout)
            .boxed(),
    }
}

fn file_layer(format: LogFormat, writer: tracing_appender::non_blocking::NonBlocking) -> Box<dyn Layer<Registry> + Send + Sync>
{
    match format {
        LogFormat::Pretty => fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_ansi(false) // No ANSI in files
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(writer)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_current_span(true)
            .with_span_list(true)
            .boxed(),
    }
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// Log file path has no file name
    #[error("Invalid log file path: {0}")]
    InvalidFile(String),

    /// Failed to initialize logging
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// File logging error
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}
