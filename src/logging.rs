//! Tracing subscriber setup.
//!
//! Structured events from the session (handshake, activation, readings) and
//! from the header resolver go through `tracing`. Binaries call [`init`] or
//! [`init_from_config`] once; the library itself never installs a subscriber.
//!
//! `RUST_LOG` overrides the configured level when set.
//!
//! # Example
//! ```no_run
//! use wlm_daq::{config::WlmConfig, logging};
//!
//! let config = WlmConfig::load()?;
//! logging::init_from_config(&config)?;
//! tracing::info!("Wavelength meter monitor started");
//! # Ok::<(), wlm_daq::WlmError>(())
//! ```

use std::io::IsTerminal;

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::config::WlmConfig;
use crate::error::{WlmError, WlmResult};

/// Output format for log lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Multi-line with colors, for interactive use
    Pretty,
    /// One line per event
    #[default]
    Compact,
    /// Newline-delimited JSON
    Json,
}

/// Subscriber options
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Most verbose level emitted when `RUST_LOG` is unset
    pub level: Level,
    /// Line layout
    pub format: OutputFormat,
    /// Emit span open/close events (handshake, spectrum)
    pub with_span_events: bool,
    /// Source location on every event
    pub with_file_and_line: bool,
    /// Color escapes for the pretty and compact formats
    pub with_ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: OutputFormat::Compact,
            with_span_events: false,
            with_file_and_line: false,
            with_ansi: true,
        }
    }
}

impl LoggingConfig {
    /// Defaults at the given level.
    pub fn new(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Level and format from the `[application]` section.
    ///
    /// Verbose runs also trace span open/close, and colors are only used when
    /// stderr is a terminal.
    pub fn from_config(config: &WlmConfig) -> WlmResult<Self> {
        let application = &config.application;
        Ok(Self::new(parse_log_level(&application.log_level)?)
            .with_format(application.log_format)
            .with_span_events(application.verbose)
            .with_ansi(std::io::stderr().is_terminal()))
    }

    /// Set the line layout.
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Toggle span open/close events.
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.with_span_events = enabled;
        self
    }

    /// Toggle color escapes.
    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.with_ansi = enabled;
        self
    }
}

/// Initialize logging from the `[application]` section.
pub fn init_from_config(config: &WlmConfig) -> WlmResult<()> {
    init(LoggingConfig::from_config(config)?)
}

/// Install the global subscriber.
///
/// Calling this again after a subscriber is installed is a no-op.
pub fn init(config: LoggingConfig) -> WlmResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str().to_lowercase()));

    let span_events = if config.with_span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_span_events(span_events)
        .with_file(config.with_file_and_line)
        .with_line_number(config.with_file_and_line);

    let result = match config.format {
        OutputFormat::Pretty => tracing_subscriber::registry()
            .with(
                layer
                    .pretty()
                    .with_ansi(config.with_ansi)
                    .with_filter(env_filter),
            )
            .try_init(),
        OutputFormat::Compact => tracing_subscriber::registry()
            .with(
                layer
                    .compact()
                    .with_ansi(config.with_ansi)
                    .with_filter(env_filter),
            )
            .try_init(),
        OutputFormat::Json => tracing_subscriber::registry()
            .with(layer.json().with_filter(env_filter))
            .try_init(),
    };

    result.or_else(|e| {
        if e.to_string().contains("a global default trace dispatcher has already been set") {
            Ok(())
        } else {
            Err(WlmError::Configuration(format!(
                "Failed to initialize logging: {e}"
            )))
        }
    })
}

/// Parse a level name, case-insensitively.
pub fn parse_log_level(level: &str) -> WlmResult<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(WlmError::Configuration(format!(
            "Invalid log level '{level}'. Must be one of: trace, debug, info, warn, error"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("trace").unwrap(), Level::TRACE);
        assert_eq!(parse_log_level("warn").unwrap(), Level::WARN);

        // Case insensitive
        assert_eq!(parse_log_level("INFO").unwrap(), Level::INFO);
        assert_eq!(parse_log_level("Debug").unwrap(), Level::DEBUG);

        assert!(parse_log_level("invalid").is_err());
    }

    #[test]
    fn test_logging_config_from_file_settings() {
        let mut config = WlmConfig::default();
        config.application.log_level = "debug".to_string();
        let logging = LoggingConfig::from_config(&config).unwrap();
        assert_eq!(logging.level, Level::DEBUG);
        assert_eq!(logging.format, OutputFormat::Compact);
        assert!(!logging.with_span_events);

        config.application.log_format = OutputFormat::Json;
        config.application.verbose = true;
        let logging = LoggingConfig::from_config(&config).unwrap();
        assert_eq!(logging.format, OutputFormat::Json);
        assert!(logging.with_span_events);
    }

    #[test]
    fn test_logging_config_builder() {
        let config = LoggingConfig::new(Level::WARN)
            .with_format(OutputFormat::Json)
            .with_span_events(true)
            .with_ansi(false);

        assert_eq!(config.level, Level::WARN);
        assert_eq!(config.format, OutputFormat::Json);
        assert!(config.with_span_events);
        assert!(!config.with_ansi);
    }

    #[test]
    fn test_init_is_idempotent() {
        assert!(init(LoggingConfig::default()).is_ok());
        assert!(init(LoggingConfig::default()).is_ok());
    }
}
