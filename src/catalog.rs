//! Error catalog and numeric result classification.
//!
//! The driver never reports failure out of band. A query such as
//! `GetWavelength` returns either a wavelength or one of the `Err*` codes; a
//! command such as `Operation` returns `ResERR_NoErr` (0) or one of the
//! `ResERR_*` codes. The catalog holds both partitions, built once while the
//! header is resolved, and [`ErrorCatalog::classify`] tells the two apart.

use serde::Serialize;

use crate::error::{WlmError, WlmResult};

/// Name prefix of codes a query may return instead of a value.
pub const READ_ERROR_PREFIX: &str = "Err";

/// Name prefix of command result codes.
pub const SET_ERROR_PREFIX: &str = "ResERR";

/// Value of the "no error" command result.
pub const NO_ERROR_SENTINEL: i64 = 0;

/// Which partition a result is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Channel {
    /// Query results, checked against `Err*` codes.
    Read,
    /// Command/configuration results, checked against non-zero `ResERR*` codes.
    Set,
}

/// A cataloged error constant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorCode {
    /// Symbolic name from the header
    pub name: String,
    /// Resolved numeric value
    pub value: i64,
}

/// The two disjoint error partitions derived from the header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorCatalog {
    read_errors: Vec<ErrorCode>,
    set_errors: Vec<ErrorCode>,
}

impl ErrorCatalog {
    /// Codes a read/query operation may return in place of a value.
    pub fn read_errors(&self) -> &[ErrorCode] {
        &self.read_errors
    }

    /// Non-zero codes a set/command operation may return.
    pub fn set_errors(&self) -> &[ErrorCode] {
        &self.set_errors
    }

    /// The partition consulted for `channel`.
    pub fn partition(&self, channel: Channel) -> &[ErrorCode] {
        match channel {
            Channel::Read => &self.read_errors,
            Channel::Set => &self.set_errors,
        }
    }

    /// Record a freshly resolved constant in the partition its name selects.
    ///
    /// A redeclared name first leaves whichever partition it was in, so the
    /// catalog always reflects the latest value.
    pub(crate) fn classify_constant(&mut self, name: &str, value: i64) {
        self.read_errors.retain(|code| code.name != name);
        self.set_errors.retain(|code| code.name != name);

        let code = ErrorCode {
            name: name.to_string(),
            value,
        };
        if name.starts_with(SET_ERROR_PREFIX) {
            if value != NO_ERROR_SENTINEL {
                self.set_errors.push(code);
            }
        } else if name.starts_with(READ_ERROR_PREFIX) {
            self.read_errors.push(code);
        }
    }

    /// Look up the cataloged error whose value equals `code`.
    pub fn lookup(&self, code: i64, channel: Channel) -> Option<&ErrorCode> {
        self.partition(channel).iter().find(|entry| entry.value == code)
    }

    /// Fail with [`WlmError::Instrument`] if `code` is a cataloged error.
    ///
    /// Returns the code unchanged otherwise.
    pub fn classify(&self, code: i64, channel: Channel) -> WlmResult<i64> {
        match self.lookup(code, channel) {
            Some(entry) => Err(WlmError::Instrument {
                name: entry.name.clone(),
                code,
            }),
            None => Ok(code),
        }
    }

    /// Floating-point variant of [`classify`](Self::classify).
    ///
    /// The value is truncated toward zero for the comparison only; a valid
    /// measurement is returned with its full precision.
    pub fn classify_f64(&self, value: f64, channel: Channel) -> WlmResult<f64> {
        self.classify(value.trunc() as i64, channel)?;
        Ok(value)
    }
}
