//! # WLM DAQ
//!
//! Binding for HighFinesse wavelength meters driven through the vendor's
//! `wlmData` library. The vendor header `wlmData.h` is the source of truth for
//! every numeric constant and error code; it is parsed at startup rather than
//! compiled in, so the binding follows whatever SDK release is installed.
//!
//! ## Crate Structure
//!
//! - **`constants`**: resolves the `const int` section of `wlmData.h` into a
//!   [`ConstantNamespace`](constants::ConstantNamespace).
//! - **`catalog`**: partitions the resolved names into read-error and
//!   set-error codes and classifies raw driver results against them.
//! - **`driver`**: the [`WlmDriver`](driver::WlmDriver) collaborator trait with
//!   a simulated implementation and, behind the `wlm-sdk` feature, the native
//!   shared library.
//! - **`memory`**: the one place that reads driver-owned analysis buffers.
//! - **`session`**: [`InstrumentSession`], the process-wide connection with
//!   handshake, lazy measurement activation and typed accessors.
//! - **`measurement`**: value types returned by the session.
//! - **`ranges`**: static wavelength range table.
//! - **`config`** / **`logging`**: figment configuration and tracing setup.
//! - **`error`**: [`WlmError`] for everything above.
//!
//! ## Quick start
//!
//! ```no_run
//! use wlm_daq::constants::{load_header, ResolvePolicy};
//! use wlm_daq::driver::MockDriver;
//! use wlm_daq::ranges::WavelengthRangeTable;
//! use wlm_daq::{InstrumentSession, SessionOptions};
//!
//! let header = load_header("wlmData.h", ResolvePolicy::Strict)?;
//! let session = InstrumentSession::connect(
//!     MockDriver::new(),
//!     header,
//!     WavelengthRangeTable::default(),
//!     SessionOptions::default(),
//! )?;
//! println!("{}", session.version()?);
//! println!("{}", session.range()?);
//! # Ok::<(), wlm_daq::WlmError>(())
//! ```

pub mod catalog;
pub mod config;
pub mod constants;
pub mod driver;
pub mod error;
pub mod logging;
pub mod measurement;
#[allow(unsafe_code)]
pub mod memory;
pub mod ranges;
#[allow(unsafe_code)]
pub mod session;

pub use catalog::{Channel, ErrorCatalog, ErrorCode};
pub use constants::{ConstantNamespace, HeaderReport, ResolvePolicy};
pub use error::{WlmError, WlmResult};
pub use measurement::{Amplitude, Amplitudes, Linewidth, RangeLookup, Spectrum, SpectrumPoint, Version};
pub use ranges::{WavelengthRange, WavelengthRangeTable};
pub use session::{InstrumentSession, SessionOptions};
