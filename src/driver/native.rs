//! `libwlmData` loaded at runtime.
//!
//! Symbols are resolved lazily and cached; an entry point missing from the
//! installed SDK only fails when it is first called. Each call is dispatched
//! through the function pointer type matching the C prototype, and the return
//! width requested by the caller must agree with that prototype.

#![allow(unsafe_code)]

use std::collections::HashMap;
use std::os::raw::{c_long, c_ushort};
use std::path::Path;

use tracing::{debug, info, warn};
use wlm_sys::{
    DoubleToDouble, Library, Long2ToLong, Long3ToLong, Long4ToLong, LongDoubleToDouble, LongToLong,
    LongToPtr, UShortToLong, UShortToUShort,
};

use super::{Arg, Entry, RawValue, ReturnWidth, WlmDriver};
use crate::error::{WlmError, WlmResult};

/// Driver backed by the vendor shared library.
pub struct NativeDriver {
    library: Library,
    /// Resolved symbol addresses.
    symbols: HashMap<Entry, usize>,
}

impl std::fmt::Debug for NativeDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeDriver")
            .field("path", &self.library.path())
            .field("resolved", &self.symbols.len())
            .finish()
    }
}

impl NativeDriver {
    /// Load the library at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> WlmResult<Self> {
        let path = path.as_ref();
        let library = Library::open(path).map_err(|e| WlmError::DriverNotFound {
            path: path.to_path_buf(),
            message: e.message,
        })?;
        info!(path = %path.display(), "Loaded wlmData library");
        let mut driver = Self {
            library,
            symbols: HashMap::new(),
        };
        let missing = driver.missing_entry_points();
        if !missing.is_empty() {
            warn!(
                path = %path.display(),
                missing = ?missing,
                "Library does not export every wlmData entry point"
            );
        }
        Ok(driver)
    }

    /// Entry points the loaded library does not export.
    ///
    /// Calling one of them fails with `MissingEntryPoint`; the rest stay usable.
    pub fn missing_entry_points(&mut self) -> Vec<Entry> {
        Entry::ALL
            .into_iter()
            .filter(|&entry| self.resolve(entry).is_err())
            .collect()
    }

    fn resolve(&mut self, entry: Entry) -> WlmResult<usize> {
        if let Some(&address) = self.symbols.get(&entry) {
            return Ok(address);
        }
        let symbol = self.library.symbol(entry.symbol()).map_err(|e| {
            debug!(%entry, error = %e, "Entry point not exported");
            WlmError::MissingEntryPoint { entry }
        })?;
        let address = symbol as usize;
        self.symbols.insert(entry, address);
        Ok(address)
    }
}

fn long(args: &[Arg], i: usize) -> c_long {
    args[i].as_i64() as c_long
}

fn ushort(args: &[Arg], i: usize) -> c_ushort {
    args[i].as_i64() as c_ushort
}

fn double(args: &[Arg], i: usize) -> f64 {
    args[i].as_f64()
}

impl WlmDriver for NativeDriver {
    fn invoke(&mut self, entry: Entry, args: &[Arg], width: ReturnWidth) -> WlmResult<RawValue> {
        if args.len() != entry.args().len() {
            return Err(WlmError::InvalidArguments {
                entry,
                expected: entry.args().len(),
                got: args.len(),
            });
        }
        if width != entry.return_width() {
            return Err(WlmError::WidthMismatch {
                entry,
                expected: entry.return_width(),
                requested: width,
            });
        }

        let address = self.resolve(entry)?;
        let symbol = address as *const ();

        // SAFETY: each arm casts the symbol to the prototype declared for that
        // entry point in wlmData.h; argument counts were checked above.
        let value = unsafe {
            match entry {
                Entry::Instantiate => {
                    let f: Long4ToLong = std::mem::transmute(symbol);
                    RawValue::Int(i64::from(f(
                        long(args, 0),
                        long(args, 1),
                        long(args, 2),
                        long(args, 3),
                    )))
                }
                Entry::ControlWlm | Entry::GetAmplitudeNum => {
                    let f: Long3ToLong = std::mem::transmute(symbol);
                    RawValue::Int(i64::from(f(long(args, 0), long(args, 1), long(args, 2))))
                }
                Entry::SetAnalysis => {
                    let f: Long2ToLong = std::mem::transmute(symbol);
                    RawValue::Int(i64::from(f(long(args, 0), long(args, 1))))
                }
                Entry::GetInterval
                | Entry::SetInterval
                | Entry::SetAnalysisMode
                | Entry::GetAnalysisItemSize
                | Entry::GetAnalysisItemCount
                | Entry::GetWlmVersion => {
                    let f: LongToLong = std::mem::transmute(symbol);
                    RawValue::Int(i64::from(f(long(args, 0))))
                }
                Entry::GetAnalysisItemAddress => {
                    let f: LongToPtr = std::mem::transmute(symbol);
                    RawValue::Long(f(long(args, 0)) as i64)
                }
                Entry::GetOperationState | Entry::GetRange => {
                    let f: UShortToUShort = std::mem::transmute(symbol);
                    // unsigned short on the wire; error codes come back as negative shorts
                    RawValue::Short(f(ushort(args, 0)) as i16)
                }
                Entry::Operation | Entry::SetRange | Entry::SetWideMode => {
                    let f: UShortToLong = std::mem::transmute(symbol);
                    RawValue::Int(i64::from(f(ushort(args, 0))))
                }
                Entry::GetTemperature | Entry::GetWavelength | Entry::GetFrequency => {
                    let f: DoubleToDouble = std::mem::transmute(symbol);
                    RawValue::Double(f(double(args, 0)))
                }
                Entry::GetLinewidth => {
                    let f: LongDoubleToDouble = std::mem::transmute(symbol);
                    RawValue::Double(f(long(args, 0), double(args, 1)))
                }
            }
        };
        Ok(value)
    }

    fn describe(&self) -> String {
        format!("libwlmData ({})", self.library.path().display())
    }
}
