//! Logging system initialization and configuration
//!
//! Uses the tracing ecosystem for structured logging with support for:
//! - Environment variable override (BEMCP_LOG)
//! - Pretty, compact and JSON console output on stderr
//! - Optional file output with daily rotation

use std::path::PathBuf;
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Environment variable holding a filter directive
pub const LOG_ENV: &str = "BEMCP_LOG";

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default log level
    pub level: Level,
    /// Output format: "pretty", "json", "compact"
    pub format: LogFormat,
    /// Show timestamps
    pub timestamps: bool,
    /// Show file and line numbers
    pub file_line: bool,
    /// Enable file output
    pub file_output: bool,
    /// Log file directory path
    pub file_path: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            format: LogFormat::Compact,
            timestamps: true,
            file_line: false,
            file_output: false,
            file_path: None,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
}

impl LogFormat {
    /// Lenient parse; anything unrecognized is `Pretty`.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }
}

/// Get the default log directory path
fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bemcp")
        .join("logs")
}

fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        EnvFilter::new(format!("bemcp={}", config.level.as_str().to_lowercase()))
    })
}

fn console_layer(config: &LoggingConfig) -> Box<dyn Layer<Registry> + Send + Sync> {
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_file(config.file_line)
        .with_line_number(config.file_line);

    match (config.format, config.timestamps) {
        (LogFormat::Json, true) => layer.json().boxed(),
        (LogFormat::Json, false) => layer.json().without_time().boxed(),
        (LogFormat::Compact, true) => layer.compact().boxed(),
        (LogFormat::Compact, false) => layer.compact().without_time().boxed(),
        (LogFormat::Pretty, true) => layer.pretty().boxed(),
        (LogFormat::Pretty, false) => layer.pretty().without_time().boxed(),
    }
}

fn file_layer(config: &LoggingConfig) -> Option<Box<dyn Layer<Registry> + Send + Sync>> {
    if !config.file_output {
        return None;
    }

    let log_dir = config.file_path.clone().unwrap_or_else(default_log_dir);

    // Ensure log directory exists
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Failed to create log directory {:?}: {}", log_dir, e);
        return None;
    }

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "bemcp.log");

    let layer = fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_span_events(FmtSpan::CLOSE);

    Some(layer.boxed())
}

/// Initialize the logging system
///
/// # Environment Variables
/// - `BEMCP_LOG`: Override the filter (e.g., "bemcp=debug,rmcp=info")
pub fn init_logging(config: &LoggingConfig) {
    let mut layers = vec![console_layer(config)];
    layers.extend(file_layer(config));

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter(config))
        .init();

    tracing::debug!(
        level = %config.level,
        format = ?config.format,
        file_output = config.file_output,
        "Logging configuration"
    );
}

/// Parse log level from string
pub fn parse_level(s: &str) -> Level {
    match s.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!(LogFormat::from_str("json"), LogFormat::Json);
        assert_eq!(LogFormat::from_str("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::from_str("compact"), LogFormat::Compact);
        assert_eq!(LogFormat::from_str("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("unknown"), LogFormat::Pretty);
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("trace"), Level::TRACE);
        assert_eq!(parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_level("warning"), Level::WARN);
        assert_eq!(parse_level("error"), Level::ERROR);
        assert_eq!(parse_level("loud"), Level::INFO);
    }

    #[test]
    fn test_default_config_is_quiet() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, Level::WARN);
        assert_eq!(config.format, LogFormat::Compact);
        assert!(!config.file_output);
        assert!(config.file_path.is_none());
    }

    #[test]
    fn test_file_layer_disabled_by_default() {
        assert!(file_layer(&LoggingConfig::default()).is_none());
    }

    #[test]
    fn test_file_layer_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("nested").join("logs");
        let config = LoggingConfig {
            file_output: true,
            file_path: Some(log_dir.clone()),
            ..Default::default()
        };

        assert!(file_layer(&config).is_some());
        assert!(log_dir.is_dir());
    }
}
