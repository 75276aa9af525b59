//! Driver collaborator interface.
//!
//! `wlmData` exposes a flat C API: every entry point takes a handful of
//! numeric arguments and returns a single number whose C type differs per
//! function. The session talks to it through [`WlmDriver::invoke`], naming the
//! entry point and the return width it expects. Getting the width wrong would
//! reinterpret the returned bits, so implementations that know the real C
//! signatures reject a mismatch instead of guessing.
//!
//! # Implementations
//!
//! - [`MockDriver`](mock::MockDriver) - simulated wavelength meter, always available
//! - `NativeDriver` - `libwlmData` loaded at runtime (feature `wlm-sdk`, Unix only)

use std::fmt;

use serde::Serialize;

use crate::error::WlmResult;

pub mod mock;
#[cfg(all(feature = "wlm-sdk", unix))]
pub mod native;

pub use mock::MockDriver;
#[cfg(all(feature = "wlm-sdk", unix))]
pub use native::NativeDriver;

/// C return type an entry point is invoked with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ReturnWidth {
    /// `short` / `unsigned short`
    Short,
    /// `long` (driver status codes and counts)
    Int,
    /// Pointer-sized integer (memory addresses)
    Long,
    /// `double`
    Double,
}

impl fmt::Display for ReturnWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Short => "short",
            Self::Int => "long",
            Self::Long => "intptr",
            Self::Double => "double",
        };
        f.write_str(name)
    }
}

/// Argument kind in an entry point's C signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// C `long`
    Int,
    /// C `unsigned short`
    Short,
    /// C `double`
    Double,
}

/// `wlmData` entry points used by the binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Entry {
    /// Presence check and return-mode setup
    Instantiate,
    /// Start or stop the server application
    ControlWlm,
    /// Current operation state
    GetOperationState,
    /// Start or stop a measurement
    Operation,
    /// Operating temperature
    GetTemperature,
    /// Vacuum wavelength of channel 1
    GetWavelength,
    /// Frequency of channel 1
    GetFrequency,
    /// Measurement interval
    GetInterval,
    /// Change the measurement interval
    SetInterval,
    /// Current wavelength range index
    GetRange,
    /// Select a wavelength range
    SetRange,
    /// Switch the analysis on or off
    SetAnalysisMode,
    /// Enable an analysis signal
    SetAnalysis,
    /// Precision/wide measurement mode
    SetWideMode,
    /// Byte width of one analysis sample
    GetAnalysisItemSize,
    /// Number of analysis samples
    GetAnalysisItemCount,
    /// Address of the analysis buffer
    GetAnalysisItemAddress,
    /// Type, version, revision or build number
    GetWlmVersion,
    /// Interferometer amplitude for a channel
    GetAmplitudeNum,
    /// Linewidth analysis result in a given unit
    GetLinewidth,
}

impl Entry {
    /// Every entry point, in header order.
    pub const ALL: [Entry; 20] = [
        Entry::Instantiate,
        Entry::ControlWlm,
        Entry::GetOperationState,
        Entry::Operation,
        Entry::GetTemperature,
        Entry::GetWavelength,
        Entry::GetFrequency,
        Entry::GetInterval,
        Entry::SetInterval,
        Entry::GetRange,
        Entry::SetRange,
        Entry::SetAnalysisMode,
        Entry::SetAnalysis,
        Entry::SetWideMode,
        Entry::GetAnalysisItemSize,
        Entry::GetAnalysisItemCount,
        Entry::GetAnalysisItemAddress,
        Entry::GetWlmVersion,
        Entry::GetAmplitudeNum,
        Entry::GetLinewidth,
    ];

    /// Exported symbol name.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Instantiate => "Instantiate",
            Self::ControlWlm => "ControlWLM",
            Self::GetOperationState => "GetOperationState",
            Self::Operation => "Operation",
            Self::GetTemperature => "GetTemperature",
            Self::GetWavelength => "GetWavelength",
            Self::GetFrequency => "GetFrequency",
            Self::GetInterval => "GetInterval",
            Self::SetInterval => "SetInterval",
            Self::GetRange => "GetRange",
            Self::SetRange => "SetRange",
            Self::SetAnalysisMode => "SetAnalysisMode",
            Self::SetAnalysis => "SetAnalysis",
            Self::SetWideMode => "SetWideMode",
            Self::GetAnalysisItemSize => "GetAnalysisItemSize",
            Self::GetAnalysisItemCount => "GetAnalysisItemCount",
            Self::GetAnalysisItemAddress => "GetAnalysisItemAddress",
            Self::GetWlmVersion => "GetWLMVersion",
            Self::GetAmplitudeNum => "GetAmplitudeNum",
            Self::GetLinewidth => "GetLinewidth",
        }
    }

    /// Argument kinds of the C prototype.
    pub fn args(self) -> &'static [ArgKind] {
        use ArgKind::*;
        match self {
            Self::Instantiate => &[Int, Int, Int, Int],
            Self::ControlWlm => &[Int, Int, Int],
            Self::GetOperationState | Self::Operation | Self::GetRange | Self::SetRange => {
                &[Short]
            }
            Self::SetWideMode => &[Short],
            Self::GetTemperature | Self::GetWavelength | Self::GetFrequency => &[Double],
            Self::GetInterval
            | Self::SetInterval
            | Self::SetAnalysisMode
            | Self::GetAnalysisItemSize
            | Self::GetAnalysisItemCount
            | Self::GetAnalysisItemAddress
            | Self::GetWlmVersion => &[Int],
            Self::SetAnalysis => &[Int, Int],
            Self::GetAmplitudeNum => &[Int, Int, Int],
            Self::GetLinewidth => &[Int, Double],
        }
    }

    /// Return width of the C prototype.
    pub fn return_width(self) -> ReturnWidth {
        match self {
            Self::GetOperationState | Self::GetRange => ReturnWidth::Short,
            Self::GetTemperature
            | Self::GetWavelength
            | Self::GetFrequency
            | Self::GetLinewidth => ReturnWidth::Double,
            Self::GetAnalysisItemAddress => ReturnWidth::Long,
            _ => ReturnWidth::Int,
        }
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A numeric argument passed to the driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arg {
    /// Passed as `long` or `unsigned short`
    Int(i64),
    /// Passed as `double`
    Double(f64),
}

impl Arg {
    /// Integer view, truncating doubles.
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Int(v) => v,
            Self::Double(v) => v as i64,
        }
    }

    /// Floating-point view.
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(v) => v as f64,
            Self::Double(v) => v,
        }
    }
}

impl From<i64> for Arg {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Arg {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

/// Value returned by the driver, tagged with the width it was read as.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawValue {
    /// C `short`, sign-extended
    Short(i16),
    /// C `long`
    Int(i64),
    /// Pointer-sized `long`, used for addresses
    Long(i64),
    /// C `double`
    Double(f64),
}

impl RawValue {
    /// The width this value was read as.
    pub fn width(self) -> ReturnWidth {
        match self {
            Self::Short(_) => ReturnWidth::Short,
            Self::Int(_) => ReturnWidth::Int,
            Self::Long(_) => ReturnWidth::Long,
            Self::Double(_) => ReturnWidth::Double,
        }
    }

    /// Integer view, truncating toward zero for doubles.
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Short(v) => i64::from(v),
            Self::Int(v) | Self::Long(v) => v,
            Self::Double(v) => v.trunc() as i64,
        }
    }

    /// Floating-point view.
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Short(v) => f64::from(v),
            Self::Int(v) | Self::Long(v) => v as f64,
            Self::Double(v) => v,
        }
    }
}

/// The external driver collaborator.
///
/// Implementations are stateful connections to a single instrument and are
/// not reentrant; [`InstrumentSession`](crate::session::InstrumentSession)
/// serialises every call.
pub trait WlmDriver: Send {
    /// Call `entry` with `args`, reading the result as `width`.
    fn invoke(&mut self, entry: Entry, args: &[Arg], width: ReturnWidth) -> WlmResult<RawValue>;

    /// Short human-readable description for logs.
    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

impl<D: WlmDriver + ?Sized> WlmDriver for Box<D> {
    fn invoke(&mut self, entry: Entry, args: &[Arg], width: ReturnWidth) -> WlmResult<RawValue> {
        (**self).invoke(entry, args, width)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
