//! Error types for the wavelength-meter binding.
//!
//! This module defines [`WlmError`], the single error type returned by the
//! header resolver, the driver collaborators and the instrument session.
//!
//! ## Error Hierarchy
//!
//! - **Startup-fatal**: `HeaderNotFound`, `DriverNotFound`, `DeviceNotResponding`,
//!   `SessionBusy`. The process cannot talk to the instrument without these
//!   collaborators, and nothing retries them.
//! - **Header**: `MalformedDeclaration` for a `const int` line that cannot be
//!   resolved, `UnknownConstant` when an accessor needs a name the header never
//!   declared.
//! - **Instrument**: a driver call returned a code that matches a cataloged
//!   error constant. Carries the symbolic name so callers can decide to retry.
//! - **Spectrum decoding**: `UnsupportedItemSize`, `NullAddress` and
//!   `AxisTooLarge` guard the raw memory read.
//!
//! An unmapped wavelength range is not an error; see
//! [`RangeLookup`](crate::measurement::RangeLookup).

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::driver::{Entry, ReturnWidth};

/// Convenience alias for results using the binding error type.
pub type WlmResult<T> = std::result::Result<T, WlmError>;

/// Every failure the binding reports; see the module docs for the grouping.
#[derive(Error, Debug)]
pub enum WlmError {
    #[error("Header file not found at '{}'", path.display())]
    HeaderNotFound { path: PathBuf },

    #[error("Driver library '{}' could not be loaded: {message}", path.display())]
    DriverNotFound { path: PathBuf, message: String },

    #[error("Malformed declaration on line {line} ('{text}'): {reason}")]
    MalformedDeclaration {
        line: usize,
        text: String,
        reason: String,
    },

    #[error("Header does not define constant '{name}'")]
    UnknownConstant { name: String },

    #[error("Instrument reported {name} (code {code})")]
    Instrument { name: String, code: i64 },

    #[error("Wavelength meter did not respond within {waited:?}")]
    DeviceNotResponding { waited: Duration },

    #[error("An instrument session is already open in this process")]
    SessionBusy,

    #[error("Driver entry point {entry} returns {expected}, not {requested}")]
    WidthMismatch {
        entry: Entry,
        expected: ReturnWidth,
        requested: ReturnWidth,
    },

    #[error("Driver entry point {entry} takes {expected} arguments, got {got}")]
    InvalidArguments {
        entry: Entry,
        expected: usize,
        got: usize,
    },

    #[error("Driver does not export entry point {entry}")]
    MissingEntryPoint { entry: Entry },

    #[error("Analysis axis {axis} reports unsupported item size {size} bytes")]
    UnsupportedItemSize { axis: char, size: i64 },

    #[error("Analysis axis {axis} returned a null data address")]
    NullAddress { axis: char },

    #[error("Analysis axis {axis} reports {count} items, more than can be addressed")]
    AxisTooLarge { axis: char, count: i64 },

    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "storage_csv")]
    #[error("CSV export error: {0}")]
    Csv(#[from] csv::Error),
}

impl From<figment::Error> for WlmError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl WlmError {
    /// Whether the caller may reasonably retry the operation that failed.
    ///
    /// Only instrument-reported codes are transient; everything else points at
    /// a missing collaborator, a broken header, or a programming error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Instrument { .. })
    }

    /// Symbolic name of the instrument error, if this is one.
    pub fn instrument_error_name(&self) -> Option<&str> {
        match self {
            Self::Instrument { name, .. } => Some(name),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instrument_error_display() {
        let err = WlmError::Instrument {
            name: "ErrBigSignal".to_string(),
            code: -4,
        };
        assert!(err.to_string().contains("ErrBigSignal"));
        assert!(err.to_string().contains("-4"));
        assert_eq!(err.instrument_error_name(), Some("ErrBigSignal"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_startup_errors_are_fatal() {
        let err = WlmError::HeaderNotFound {
            path: PathBuf::from("/nowhere/wlmData.h"),
        };
        assert!(err.to_string().contains("/nowhere/wlmData.h"));
        assert!(!err.is_recoverable());
        assert_eq!(err.instrument_error_name(), None);

        let err = WlmError::DeviceNotResponding {
            waited: Duration::from_secs(10),
        };
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_width_mismatch_names_entry() {
        let err = WlmError::WidthMismatch {
            entry: Entry::GetWavelength,
            expected: ReturnWidth::Double,
            requested: ReturnWidth::Int,
        };
        let msg = err.to_string();
        assert!(msg.contains("GetWavelength"));
        assert!(msg.contains("double"));
    }
}
