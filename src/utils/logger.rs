//! Logging utilities
//!
//! Sets up tracing output for the CLI.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Log level configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!(
                "Unknown log level '{other}', expected one of trace, debug, info, warn, error"
            )),
        }
    }
}

/// Filter directives for the harness and the kube client beneath it
fn directives(level: LogLevel) -> String {
    let kube_level = match level {
        LogLevel::Trace => LogLevel::Debug,
        _ => LogLevel::Warn,
    };
    format!(
        "kuadrant_harness={},kube={}",
        level.to_tracing_level(),
        kube_level.to_tracing_level()
    )
}

/// Level from the `--verbose` flag, else the configured level, else info
pub fn level_from(verbose: bool, configured: Option<&str>) -> Result<LogLevel, String> {
    if verbose {
        return Ok(LogLevel::Debug);
    }
    configured.map_or(Ok(LogLevel::Info), LogLevel::from_str)
}

/// Initialize the logger with specified level
pub fn init_logger(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directives(level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
