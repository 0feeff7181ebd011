//! Logging Configuration
//!
//! Structured logging to stderr with a configurable level and plain or JSON
//! output. `RUST_LOG` takes precedence over the configured level.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Log format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable plain text
    #[default]
    Plain,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" | "text" => Ok(LogFormat::Plain),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    const ALL: [LogLevel; 5] = [
        LogLevel::Trace,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Filter directives: request traces from the HTTP layer only at debug and below
    fn directives(&self) -> String {
        match self {
            LogLevel::Trace | LogLevel::Debug => format!("{},tower_http=debug", self.as_str()),
            _ => format!("{},tower_http=warn", self.as_str()),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        if wanted == "warning" {
            return Ok(LogLevel::Warn);
        }
        LogLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == wanted)
            .ok_or_else(|| format!("unknown log level '{}'", s))
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `[logging]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: LogLevel,

    /// Log format (plain, json)
    pub format: LogFormat,

    /// Include file and line number in events
    pub file_and_line: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::with_level(LogLevel::Info)
    }
}

impl LoggingConfig {
    pub fn with_level(level: LogLevel) -> Self {
        Self {
            level,
            format: LogFormat::Plain,
            file_and_line: false,
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.directives()))
    }

    /// Install the global subscriber; fails if one is already installed
    pub fn init(&self) -> Result<()> {
        match self.format {
            LogFormat::Plain => {
                let layer = fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_file(self.file_and_line)
                    .with_line_number(self.file_and_line)
                    .with_target(false)
                    .with_filter(self.filter());
                tracing_subscriber::registry().with(layer).try_init()?;
            }
            LogFormat::Json => {
                let layer = fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_file(self.file_and_line)
                    .with_line_number(self.file_and_line)
                    .with_current_span(false)
                    .with_filter(self.filter());
                tracing_subscriber::registry().with(layer).try_init()?;
            }
        }

        tracing::debug!("quotaguard logging at {} ({:?})", self.level, self.format);
        Ok(())
    }
}
