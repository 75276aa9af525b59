//! Configuration loading using Figment.
//!
//! Configuration is merged from:
//! 1. a TOML file (default `config/wlm.toml`)
//! 2. environment variables prefixed with `WLM_DAQ_`, nested keys split on `__`
//!
//! Every field has a default, so an empty or missing file yields a working
//! configuration for the vendor's default install layout.
//!
//! # Example
//! ```no_run
//! use wlm_daq::config::WlmConfig;
//!
//! let config = WlmConfig::load()?;
//! config.validate()?;
//! println!("Header: {}", config.paths.header.display());
//! # Ok::<(), wlm_daq::WlmError>(())
//! ```
//!
//! ```toml
//! [application]
//! log_level = "debug"
//! log_format = "json"
//! verbose = true
//!
//! [paths]
//! header = "/opt/HighFinesse/Headers/C/wlmData.h"
//! library = "/opt/HighFinesse/lib/libwlmData.so"
//!
//! [session]
//! settle_delay_ms = 500
//! channels = 2
//! resolve_policy = "lenient"
//!
//! [ranges]
//! table = [[0, 190.0, 260.0], [1, 250.0, 330.0], [2, 320.0, 420.0]]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::constants::ResolvePolicy;
use crate::error::{WlmError, WlmResult};
use crate::logging::OutputFormat;
use crate::ranges::WavelengthRangeTable;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/wlm.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "WLM_DAQ_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WlmConfig {
    /// Logging and status reporting
    pub application: ApplicationConfig,
    /// Vendor header and library locations
    pub paths: PathsConfig,
    /// Handshake, activation and channel settings
    pub session: SessionConfig,
    /// Wavelength range table override
    pub ranges: RangesConfig,
}

/// Application-level settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log line layout (pretty, compact, json)
    pub log_format: OutputFormat,
    /// Report instrument status at info level
    pub verbose: bool,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: OutputFormat::default(),
            verbose: false,
        }
    }
}

/// Locations of the vendor collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// `wlmData.h`
    pub header: PathBuf,
    /// `libwlmData` shared library
    pub library: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            header: PathBuf::from("wlmData.h"),
            library: PathBuf::from("libwlmData.so"),
        }
    }
}

/// Instrument session behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Wait after starting a measurement before reading it
    pub settle_delay_ms: u64,
    /// Give up on the presence handshake after this long
    pub handshake_timeout_ms: u64,
    /// First delay between presence polls
    pub handshake_initial_backoff_ms: u64,
    /// Cap on the doubling poll delay
    pub handshake_max_backoff_ms: u64,
    /// Number of interferometer channels (model dependent)
    pub channels: u32,
    /// `SetWideMode` argument used for spectrum analysis
    pub wide_mode: i64,
    /// How unresolvable header declarations are treated
    pub resolve_policy: ResolvePolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 500,
            handshake_timeout_ms: 10_000,
            handshake_initial_backoff_ms: 50,
            handshake_max_backoff_ms: 1_000,
            channels: 2,
            wide_mode: 1,
            resolve_policy: ResolvePolicy::Strict,
        }
    }
}

impl SessionConfig {
    /// [`settle_delay_ms`](Self::settle_delay_ms) as a `Duration`.
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// [`handshake_timeout_ms`](Self::handshake_timeout_ms) as a `Duration`.
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// [`handshake_initial_backoff_ms`](Self::handshake_initial_backoff_ms) as a `Duration`.
    pub fn handshake_initial_backoff(&self) -> Duration {
        Duration::from_millis(self.handshake_initial_backoff_ms)
    }

    /// [`handshake_max_backoff_ms`](Self::handshake_max_backoff_ms) as a `Duration`.
    pub fn handshake_max_backoff(&self) -> Duration {
        Duration::from_millis(self.handshake_max_backoff_ms)
    }
}

/// Optional replacement for the built-in wavelength range table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangesConfig {
    /// Rows of `[index, min_nm, max_nm]`
    pub table: Option<Vec<(i64, f64, f64)>>,
}

impl WlmConfig {
    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment.
    pub fn load() -> WlmResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file path and the environment.
    ///
    /// A missing file is not an error; defaults apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> WlmResult<Self> {
        Ok(Self::figment(path).extract()?)
    }

    /// The merged provider stack, exposed for callers that add their own layers.
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::from(Serialized::defaults(WlmConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> WlmResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(WlmError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.session.channels == 0 {
            return Err(WlmError::Configuration(
                "session.channels must be at least 1".to_string(),
            ));
        }

        if self.session.handshake_max_backoff_ms < self.session.handshake_initial_backoff_ms {
            return Err(WlmError::Configuration(format!(
                "handshake_max_backoff_ms ({}) is smaller than handshake_initial_backoff_ms ({})",
                self.session.handshake_max_backoff_ms, self.session.handshake_initial_backoff_ms
            )));
        }

        self.range_table().map(|_| ())
    }

    /// The configured range table, or the built-in UV2 table.
    pub fn range_table(&self) -> WlmResult<WavelengthRangeTable> {
        match &self.ranges.table {
            Some(rows) => WavelengthRangeTable::new(rows.iter().copied()),
            None => Ok(WavelengthRangeTable::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults_without_file() {
        Jail::expect_with(|_jail| {
            let config = WlmConfig::load_from("missing.toml").unwrap();
            assert_eq!(config, WlmConfig::default());
            assert_eq!(config.session.settle_delay(), Duration::from_millis(500));
            assert!(config.validate().is_ok());
            Ok(())
        });
    }

    #[test]
    fn test_file_and_env_layers() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "wlm.toml",
                r#"
                [application]
                log_level = "debug"

                [session]
                channels = 8
                resolve_policy = "lenient"

                [ranges]
                table = [[0, 400.0, 1100.0]]
                "#,
            )?;
            jail.set_env("WLM_DAQ_SESSION__SETTLE_DELAY_MS", "25");
            jail.set_env("WLM_DAQ_APPLICATION__LOG_FORMAT", "json");

            let config = WlmConfig::load_from("wlm.toml").unwrap();
            assert_eq!(config.application.log_level, "debug");
            assert_eq!(config.application.log_format, OutputFormat::Json);
            assert_eq!(config.session.channels, 8);
            assert_eq!(config.session.resolve_policy, ResolvePolicy::Lenient);
            assert_eq!(config.session.settle_delay_ms, 25);
            assert_eq!(config.session.wide_mode, 1);

            let table = config.range_table().unwrap();
            assert_eq!(table.len(), 1);
            assert!(table.lookup(0).is_found());
            Ok(())
        });
    }

    #[test]
    fn test_unknown_log_format_is_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("wlm.toml", "[application]\nlog_format = \"xml\"\n")?;
            assert!(matches!(
                WlmConfig::load_from("wlm.toml"),
                Err(WlmError::Config(_))
            ));
            Ok(())
        });
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = WlmConfig::default();
        config.application.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_backoff_and_channels() {
        let mut config = WlmConfig::default();
        config.session.handshake_max_backoff_ms = 10;
        assert!(config.validate().is_err());

        let mut config = WlmConfig::default();
        config.session.channels = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_range_table() {
        let mut config = WlmConfig::default();
        config.ranges.table = Some(vec![(0, 260.0, 190.0)]);
        assert!(matches!(config.validate(), Err(WlmError::Configuration(_))));
    }
}
