//! Low-level FFI bindings for the HighFinesse `wlmData` library.
//!
//! The vendor ships `libwlmData` as a prebuilt shared object, and the exported
//! set varies between SDK releases, so nothing is linked at build time. A
//! [`Library`] is opened with `dlopen` and symbols are resolved on demand.
//!
//! The function pointer aliases below mirror the prototypes in `wlmData.h`.
//! Several entry points share a shape; the alias names describe the shape
//! (`Long3ToLong` takes three `long`s and returns a `long`).
//!
//! # Safety
//!
//! Casting a resolved symbol to the wrong alias is undefined behaviour. For a
//! safe wrapper, use `wlm_daq::driver::NativeDriver`.
//!
//! # Example (unsafe)
//!
//! ```no_run
//! use wlm_sys::{Library, DoubleToDouble};
//!
//! let lib = Library::open("libwlmData.so").unwrap();
//! unsafe {
//!     let symbol = lib.symbol("GetWavelength").unwrap();
//!     let get_wavelength: DoubleToDouble = std::mem::transmute(symbol);
//!     println!("{} nm", get_wavelength(0.0));
//! }
//! ```

#![cfg(unix)]

use std::ffi::{CStr, CString};
use std::fmt;
use std::os::raw::{c_double, c_long, c_ushort, c_void};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// `long f(long, long, long, long)`: `Instantiate`
pub type Long4ToLong = unsafe extern "C" fn(c_long, c_long, c_long, c_long) -> c_long;
/// `long f(long, long, long)`: `ControlWLM`, `GetAmplitudeNum`
pub type Long3ToLong = unsafe extern "C" fn(c_long, c_long, c_long) -> c_long;
/// `long f(long, long)`: `SetAnalysis`
pub type Long2ToLong = unsafe extern "C" fn(c_long, c_long) -> c_long;
/// `long f(long)`: intervals, analysis items, version
pub type LongToLong = unsafe extern "C" fn(c_long) -> c_long;
/// `long_ptr f(long)`: `GetAnalysisItemAddress`
pub type LongToPtr = unsafe extern "C" fn(c_long) -> isize;
/// `unsigned short f(unsigned short)`: `GetOperationState`, `GetRange`
pub type UShortToUShort = unsafe extern "C" fn(c_ushort) -> c_ushort;
/// `long f(unsigned short)`: `Operation`, `SetRange`, `SetWideMode`
pub type UShortToLong = unsafe extern "C" fn(c_ushort) -> c_long;
/// `double f(double)`: temperature, wavelength, frequency
pub type DoubleToDouble = unsafe extern "C" fn(c_double) -> c_double;
/// `double f(long, double)`: `GetLinewidth`
pub type LongDoubleToDouble = unsafe extern "C" fn(c_long, c_double) -> c_double;

/// Failure to open the library or resolve a symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadError {
    /// `dlerror` text, or why `dlopen` was not attempted
    pub message: String,
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for LoadError {}

/// Last `dlerror()` message, or `fallback` when none is pending.
fn dl_error(fallback: &str) -> LoadError {
    // SAFETY: dlerror returns null or a thread-local NUL-terminated string
    // that stays valid until the next dl* call on this thread.
    let message = unsafe {
        let err = libc::dlerror();
        if err.is_null() {
            fallback.to_string()
        } else {
            CStr::from_ptr(err).to_string_lossy().into_owned()
        }
    };
    LoadError { message }
}

/// An open handle to `libwlmData`.
#[derive(Debug)]
pub struct Library {
    handle: *mut c_void,
    path: PathBuf,
}

// SAFETY: the handle is only passed to dlsym/dlclose, which are thread-safe.
unsafe impl Send for Library {}

impl Library {
    /// `dlopen` the library at `path` (or by soname if it has no directory).
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| LoadError {
            message: format!("path contains NUL byte: {}", path.display()),
        })?;

        // SAFETY: c_path is a valid NUL-terminated string for the call.
        let handle = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
        if handle.is_null() {
            return Err(dl_error("dlopen failed"));
        }
        Ok(Self {
            handle,
            path: path.to_path_buf(),
        })
    }

    /// Path the library was opened with.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolve an exported symbol.
    pub fn symbol(&self, name: &str) -> Result<*mut c_void, LoadError> {
        let c_name = CString::new(name).map_err(|_| LoadError {
            message: format!("symbol name contains NUL byte: {name}"),
        })?;

        // SAFETY: handle is open until Drop; c_name is NUL-terminated.
        let symbol = unsafe {
            libc::dlerror();
            libc::dlsym(self.handle, c_name.as_ptr())
        };
        if symbol.is_null() {
            return Err(dl_error(&format!("symbol {name} not found")));
        }
        Ok(symbol)
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        // SAFETY: handle came from a successful dlopen and is closed once.
        unsafe {
            libc::dlclose(self.handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_library() {
        let err = Library::open("/nonexistent/libwlmData.so").unwrap_err();
        assert!(!err.message.is_empty());
    }

    #[test]
    fn test_nul_in_path() {
        let err = Library::open("lib\0wlm").unwrap_err();
        assert!(err.message.contains("NUL"));
    }
}
