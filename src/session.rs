//! Instrument session: handshake, activation state and typed accessors.
//!
//! An [`InstrumentSession`] owns the driver collaborator together with the
//! resolved header constants. Every accessor follows the same protocol:
//! look up the constants it needs, invoke the driver with the return width of
//! the entry point, run the raw number through the [`ErrorCatalog`], and only
//! then convert it into a domain value.
//!
//! # Process-wide singleton
//!
//! The driver is a single stateful connection to hardware, so only one session
//! may exist per process. A second [`connect`](InstrumentSession::connect)
//! fails with [`WlmError::SessionBusy`] until the first session is dropped.
//! Driver calls are serialised through a mutex; the session is `Send + Sync`
//! but never reenters the driver.
//!
//! # Example
//!
//! ```no_run
//! use wlm_daq::config::WlmConfig;
//! use wlm_daq::driver::MockDriver;
//! use wlm_daq::session::InstrumentSession;
//!
//! let config = WlmConfig::load()?;
//! let session = InstrumentSession::open(MockDriver::new(), &config)?;
//! println!("Wavelength: {:.4} nm", session.wavelength()?);
//! println!("Temperature: {:.2} C", session.temperature()?);
//! # Ok::<(), wlm_daq::WlmError>(())
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, info_span, warn};

use crate::catalog::{Channel, ErrorCatalog};
use crate::config::WlmConfig;
use crate::constants::{load_header, ConstantNamespace, HeaderReport};
use crate::driver::{Arg, Entry, RawValue, ReturnWidth, WlmDriver};
use crate::error::{WlmError, WlmResult};
use crate::measurement::{Amplitude, Amplitudes, Linewidth, RangeLookup, Spectrum, Version};
use crate::memory::{read_foreign, ItemType};
use crate::ranges::WavelengthRangeTable;

/// Whether a session currently owns the driver.
static SESSION_OPEN: AtomicBool = AtomicBool::new(false);

/// Status events go to `info` when verbose, `debug` otherwise.
macro_rules! status {
    ($session:expr, $($arg:tt)+) => {
        if $session.options.verbose {
            info!($($arg)+)
        } else {
            debug!($($arg)+)
        }
    };
}

/// Releases the process-wide session slot on drop.
#[derive(Debug)]
struct SessionGuard;

impl SessionGuard {
    fn acquire() -> WlmResult<Self> {
        SESSION_OPEN
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| SessionGuard)
            .map_err(|_| WlmError::SessionBusy)
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        SESSION_OPEN.store(false, Ordering::Release);
    }
}

/// Timing and model parameters of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    /// Blocking wait after starting a measurement.
    pub settle_delay: Duration,
    /// Give up on the presence check after this long.
    pub handshake_timeout: Duration,
    /// First delay between presence checks, doubled each time.
    pub handshake_initial_backoff: Duration,
    /// Upper bound on that delay.
    pub handshake_max_backoff: Duration,
    /// Interferometer channels reported by [`InstrumentSession::amplitude`].
    pub channels: u32,
    /// `SetWideMode` argument for spectrum analysis (1 = precise on the LSA).
    pub wide_mode: i64,
    /// Report readings and state changes at info level.
    pub verbose: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&WlmConfig::default())
    }
}

impl From<&WlmConfig> for SessionOptions {
    fn from(config: &WlmConfig) -> Self {
        Self {
            settle_delay: config.session.settle_delay(),
            handshake_timeout: config.session.handshake_timeout(),
            handshake_initial_backoff: config.session.handshake_initial_backoff(),
            handshake_max_backoff: config.session.handshake_max_backoff(),
            channels: config.session.channels,
            wide_mode: config.session.wide_mode,
            verbose: config.application.verbose,
        }
    }
}

/// The single connection to a wavelength meter.
pub struct InstrumentSession<D: WlmDriver> {
    driver: Mutex<D>,
    namespace: ConstantNamespace,
    catalog: ErrorCatalog,
    ranges: WavelengthRangeTable,
    options: SessionOptions,
    _guard: SessionGuard,
}

impl<D: WlmDriver> std::fmt::Debug for InstrumentSession<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentSession")
            .field("constants", &self.namespace.len())
            .field("read_errors", &self.catalog.read_errors().len())
            .field("set_errors", &self.catalog.set_errors().len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<D: WlmDriver> InstrumentSession<D> {
    /// Load the header named in `config`, then connect.
    pub fn open(driver: D, config: &WlmConfig) -> WlmResult<Self> {
        let report = load_header(&config.paths.header, config.session.resolve_policy)?;
        for skipped in &report.skipped {
            warn!(line = skipped.line, reason = %skipped.reason, "Header declaration unavailable");
        }
        Self::connect(driver, report, config.range_table()?, SessionOptions::from(config))
    }

    /// Claim the session slot and perform the driver handshake.
    ///
    /// The handshake shows the control window, polls the presence check with
    /// exponential backoff until the instrument answers or
    /// `handshake_timeout` expires, then instantiates the connection.
    pub fn connect(
        driver: D,
        report: HeaderReport,
        ranges: WavelengthRangeTable,
        options: SessionOptions,
    ) -> WlmResult<Self> {
        let guard = SessionGuard::acquire()?;
        let session = Self {
            driver: Mutex::new(driver),
            namespace: report.namespace,
            catalog: report.catalog,
            ranges,
            options,
            _guard: guard,
        };
        session.handshake()?;
        Ok(session)
    }

    fn handshake(&self) -> WlmResult<()> {
        let _span = info_span!("wlm_handshake", driver = %self.driver.lock().describe()).entered();

        let show = self.constant("cCtrlWLMShow")?;
        self.command(Entry::ControlWlm, &[Arg::Int(show), Arg::Int(0), Arg::Int(0)])?;

        let check = self.constant("cInstCheckForWLM")?;
        let started = Instant::now();
        let mut backoff = self.options.handshake_initial_backoff;
        let mut polls = 0u32;
        loop {
            polls += 1;
            let present = self
                .call(
                    Entry::Instantiate,
                    &[Arg::Int(check), Arg::Int(0), Arg::Int(0), Arg::Int(0)],
                    ReturnWidth::Int,
                )?
                .as_i64();
            if present != 0 {
                break;
            }

            let waited = started.elapsed();
            if waited >= self.options.handshake_timeout {
                warn!(polls, ?waited, "Wavelength meter did not answer presence check");
                return Err(WlmError::DeviceNotResponding { waited });
            }
            thread::sleep(backoff.min(self.options.handshake_timeout - waited));
            backoff = backoff
                .saturating_mul(2)
                .min(self.options.handshake_max_backoff);
        }

        let mode = self.constant("cInstReturnMode")?;
        self.command(
            Entry::Instantiate,
            &[Arg::Int(mode), Arg::Int(0), Arg::Int(0), Arg::Int(0)],
        )?;
        info!(polls, elapsed = ?started.elapsed(), "Connected to wavelength meter");
        Ok(())
    }

    // =========================================================================
    // Driver plumbing
    // =========================================================================

    fn call(&self, entry: Entry, args: &[Arg], width: ReturnWidth) -> WlmResult<RawValue> {
        self.driver.lock().invoke(entry, args, width)
    }

    /// Query returning a double, Read-classified.
    fn read_f64(&self, entry: Entry, args: &[Arg]) -> WlmResult<f64> {
        let raw = self.call(entry, args, ReturnWidth::Double)?;
        self.catalog.classify_f64(raw.as_f64(), Channel::Read)
    }

    /// Query returning an integer, Read-classified.
    fn read_int(&self, entry: Entry, args: &[Arg]) -> WlmResult<i64> {
        let raw = self.call(entry, args, entry.return_width())?;
        self.catalog.classify(raw.as_i64(), Channel::Read)
    }

    /// Query returning a non-negative index, state, count or amplitude.
    ///
    /// Zero is a legitimate value here, so only negative codes are looked up.
    fn read_quantity(&self, entry: Entry, args: &[Arg]) -> WlmResult<i64> {
        let value = self.call(entry, args, entry.return_width())?.as_i64();
        if value < 0 {
            self.catalog.classify(value, Channel::Read)?;
        }
        Ok(value)
    }

    /// Command returning a `ResERR_*` code, Set-classified.
    fn command(&self, entry: Entry, args: &[Arg]) -> WlmResult<i64> {
        let raw = self.call(entry, args, ReturnWidth::Int)?;
        self.catalog.classify(raw.as_i64(), Channel::Set)
    }

    fn constant(&self, name: &str) -> WlmResult<i64> {
        self.namespace.require(name)
    }

    // =========================================================================
    // Activation state
    // =========================================================================

    /// Raw operation state (`cStop`, `cAdjustment`, `cMeasurement`).
    pub fn operation_state(&self) -> WlmResult<i64> {
        self.read_quantity(Entry::GetOperationState, &[Arg::Int(0)])
    }

    /// Whether a measurement is running. Always queried, never cached.
    pub fn is_active(&self) -> WlmResult<bool> {
        let state = self.operation_state()?;
        let active = state != self.constant("cStop")?;
        status!(self, active, state, "Measurement state");
        Ok(active)
    }

    /// Start or stop measuring.
    pub fn set_active(&self, active: bool) -> WlmResult<()> {
        let name = if active {
            "cCtrlStartMeasurement"
        } else {
            "cCtrlStopAll"
        };
        let op = self.constant(name)?;
        self.command(Entry::Operation, &[Arg::Int(op)])?;
        status!(self, command = name, "Operation");
        Ok(())
    }

    /// Start a measurement if none is running, then wait for it to settle.
    ///
    /// Returns whether a measurement had to be started.
    pub fn ensure_active(&self) -> WlmResult<bool> {
        if self.is_active()? {
            return Ok(false);
        }
        self.set_active(true)?;
        debug!(delay = ?self.options.settle_delay, "Waiting for measurement to settle");
        thread::sleep(self.options.settle_delay);
        Ok(true)
    }

    // =========================================================================
    // Measurements
    // =========================================================================

    /// Operating temperature in degrees C.
    pub fn temperature(&self) -> WlmResult<f64> {
        let temperature = self.read_f64(Entry::GetTemperature, &[Arg::Double(0.0)])?;
        status!(self, temperature_c = temperature, "Temperature");
        Ok(temperature)
    }

    /// Current vacuum wavelength in nm, starting a measurement if needed.
    pub fn wavelength(&self) -> WlmResult<f64> {
        self.ensure_active()?;
        let wavelength = self.read_f64(Entry::GetWavelength, &[Arg::Double(0.0)])?;
        status!(self, wavelength_nm = wavelength, "Wavelength");
        Ok(wavelength)
    }

    /// Frequency of the strongest line in THz, starting a measurement if needed.
    pub fn frequency(&self) -> WlmResult<f64> {
        self.ensure_active()?;
        let frequency = self.read_f64(Entry::GetFrequency, &[Arg::Double(0.0)])?;
        status!(self, frequency_thz = frequency, "Frequency");
        Ok(frequency)
    }

    /// Type, version, revision and compile number.
    pub fn version(&self) -> WlmResult<Version> {
        let mut parts = [0i64; 4];
        for (i, part) in parts.iter_mut().enumerate() {
            *part = self.read_int(Entry::GetWlmVersion, &[Arg::Int(i as i64)])?;
        }
        let version = Version {
            kind: parts[0],
            major: parts[1],
            minor: parts[2],
            build: parts[3],
        };
        status!(self, %version, "Version");
        Ok(version)
    }

    /// Measurement interval in ms.
    pub fn interval(&self) -> WlmResult<i64> {
        self.read_int(Entry::GetInterval, &[Arg::Int(0)])
    }

    /// Change the measurement interval.
    pub fn set_interval(&self, interval_ms: i64) -> WlmResult<()> {
        self.command(Entry::SetInterval, &[Arg::Int(interval_ms)])?;
        status!(self, interval_ms, "Interval set");
        Ok(())
    }

    /// Current analysis range, translated through the range table.
    ///
    /// An index missing from the table is reported, not raised.
    pub fn range(&self) -> WlmResult<RangeLookup> {
        let index = self.read_quantity(Entry::GetRange, &[Arg::Int(0)])?;
        let lookup = self.ranges.lookup(index);
        if !lookup.is_found() {
            warn!(index, "Analysis range not in range table");
        }
        status!(self, %lookup, "Range");
        Ok(lookup)
    }

    /// Select a wavelength range by raw index.
    pub fn set_range(&self, index: i64) -> WlmResult<()> {
        self.command(Entry::SetRange, &[Arg::Int(index)])?;
        status!(self, index, "Range set");
        Ok(())
    }

    /// Min/max/avg interferometer amplitude per channel.
    pub fn amplitude(&self) -> WlmResult<Amplitudes> {
        let mut amplitudes = Amplitudes::new();
        for channel in 1..=self.options.channels {
            let read = |part: &str| -> WlmResult<i64> {
                let index = self.constant(&format!("c{part}{channel}"))?;
                self.read_quantity(
                    Entry::GetAmplitudeNum,
                    &[Arg::Int(i64::from(channel)), Arg::Int(index), Arg::Int(0)],
                )
            };
            let amplitude = Amplitude {
                min: read("Min")?,
                max: read("Max")?,
                avg: read("Avg")?,
            };
            amplitudes.insert(channel, amplitude);
        }
        status!(self, ?amplitudes, "Amplitudes");
        Ok(amplitudes)
    }

    /// Linewidth analysis results, starting a measurement if needed.
    pub fn linewidth(&self) -> WlmResult<Linewidth> {
        self.ensure_active()?;
        let read = |name: &str| -> WlmResult<f64> {
            let mode = self.constant(name)?;
            self.read_f64(Entry::GetLinewidth, &[Arg::Int(mode), Arg::Double(0.0)])
        };
        let linewidth = Linewidth {
            vacuum_wavelength_nm: read("cReturnWavelengthVac")?,
            air_wavelength_nm: read("cReturnWavelengthAir")?,
            frequency_thz: read("cReturnFrequency")?,
            wavenumber: read("cReturnWavenumber")?,
            photon_energy_ev: read("cReturnPhotonEnergy")?,
        };
        status!(self, ?linewidth, "Linewidth");
        Ok(linewidth)
    }

    /// Spectrum of the signal analysis channel.
    ///
    /// Enables analysis mode, selects the analysis channel and wide mode, then
    /// copies both axes out of driver-owned memory.
    pub fn spectrum(&self) -> WlmResult<Spectrum> {
        let _span = info_span!("wlm_spectrum").entered();

        self.command(Entry::SetAnalysisMode, &[Arg::Int(1)])?;
        let signal = self.constant("cSignalAnalysis")?;
        let enable = self.constant("cAnalysisEnable")?;
        self.command(Entry::SetAnalysis, &[Arg::Int(signal), Arg::Int(enable)])?;
        self.command(Entry::SetWideMode, &[Arg::Int(self.options.wide_mode)])?;

        let x_selector = self.constant("cSignalAnalysisX")?;
        let y_selector = self.constant("cSignalAnalysisY")?;

        // Hold the driver for both axes so nothing can reallocate the buffers
        // between querying an address and copying from it.
        let (wavelengths, intensities) = {
            let mut driver = self.driver.lock();
            let x = self.copy_axis(&mut *driver, 'X', x_selector)?;
            let y = self.copy_axis(&mut *driver, 'Y', y_selector)?;
            (x, y)
        };

        if wavelengths.len() != intensities.len() {
            warn!(
                x = wavelengths.len(),
                y = intensities.len(),
                "Analysis axes differ in length, truncating"
            );
        }
        let spectrum = Spectrum::from_axes(&wavelengths, &intensities);
        status!(self, points = spectrum.len(), "Spectrum");
        Ok(spectrum)
    }

    fn copy_axis(&self, driver: &mut D, axis: char, selector: i64) -> WlmResult<Vec<f64>> {
        let mut query = |entry: Entry| -> WlmResult<i64> {
            let value = driver
                .invoke(entry, &[Arg::Int(selector)], entry.return_width())?
                .as_i64();
            if value < 0 {
                self.catalog.classify(value, Channel::Read)?;
            }
            Ok(value)
        };
        let size = query(Entry::GetAnalysisItemSize)?;
        let count = query(Entry::GetAnalysisItemCount)?;
        let address = query(Entry::GetAnalysisItemAddress)?;

        let item = ItemType::from_size(size).ok_or(WlmError::UnsupportedItemSize { axis, size })?;
        debug!(%axis, size, count, "Copying analysis axis");

        // SAFETY: the driver reports `count` items of `size` bytes at
        // `address`; the buffer stays valid until the next driver call, and the
        // caller holds the driver lock for the duration of the copy.
        unsafe { read_foreign(axis, address, item, count) }
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Constants resolved from the header.
    pub fn constants(&self) -> &ConstantNamespace {
        &self.namespace
    }

    /// Error codes resolved from the header.
    pub fn catalog(&self) -> &ErrorCatalog {
        &self.catalog
    }

    /// The range table used by [`range`](Self::range).
    pub fn range_table(&self) -> &WavelengthRangeTable {
        &self.ranges
    }

    /// Options the session was opened with.
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Number of interferometer channels on this model.
    pub fn num_channels(&self) -> u32 {
        self.options.channels
    }
}

impl<D: WlmDriver> Drop for InstrumentSession<D> {
    fn drop(&mut self) {
        debug!("Closing wavelength meter session");
    }
}
