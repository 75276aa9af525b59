//! Simulated wavelength meter.
//!
//! [`MockDriver`] behaves like `wlmData` in front of a WS6 with an LSA
//! analysis channel, using the constant values of the vendor header. It
//! enforces the same argument counts and return widths as the native driver,
//! records every call, and lets tests queue raw responses to inject error
//! codes.
//!
//! The driver is moved into the session, so inspection goes through a
//! [`MockHandle`] that shares its state.
//!
//! ```
//! use wlm_daq::driver::{MockDriver, Entry};
//!
//! let driver = MockDriver::new().with_wavelength(780.24);
//! let handle = driver.handle();
//! // ... hand `driver` to an InstrumentSession ...
//! assert_eq!(handle.call_count(Entry::Operation), 0);
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use super::{Arg, Entry, RawValue, ReturnWidth, WlmDriver};
use crate::error::{WlmError, WlmResult};

// Values from wlmData.h that the simulation reacts to.
const INST_CHECK_FOR_WLM: i64 = -1;
const STATE_STOP: i64 = 0;
const SIGNAL_ANALYSIS_X: i64 = 4;
const SIGNAL_ANALYSIS_Y: i64 = 5;
const RETURN_WAVELENGTH_VAC: i64 = 0;
const RETURN_WAVELENGTH_AIR: i64 = 1;
const RETURN_FREQUENCY: i64 = 2;
const RETURN_WAVENUMBER: i64 = 3;
const RETURN_PHOTON_ENERGY: i64 = 4;
const ERR_NO_VALUE: f64 = 0.0;
const RES_NO_ERR: i64 = 0;

const SPEED_OF_LIGHT_NM_THZ: f64 = 299_792.458;
const PLANCK_EV_NM: f64 = 1_239.841_984;
const AIR_INDEX: f64 = 1.000_27;

/// Raw sample buffer for one analysis axis.
#[derive(Debug, Clone, Default)]
struct AxisBuffer {
    item_size: i64,
    count: i64,
    bytes: Vec<u8>,
}

impl AxisBuffer {
    fn from_f64(values: &[f64]) -> Self {
        Self {
            item_size: 8,
            count: values.len() as i64,
            bytes: values.iter().flat_map(|v| v.to_ne_bytes()).collect(),
        }
    }

    fn from_i32(values: &[i32]) -> Self {
        Self {
            item_size: 4,
            count: values.len() as i64,
            bytes: values.iter().flat_map(|v| v.to_ne_bytes()).collect(),
        }
    }

    fn from_i16(values: &[i16]) -> Self {
        Self {
            item_size: 2,
            count: values.len() as i64,
            bytes: values.iter().flat_map(|v| v.to_ne_bytes()).collect(),
        }
    }

    fn address(&self) -> i64 {
        self.bytes.as_ptr() as i64
    }
}

/// Shared simulation state.
#[derive(Debug)]
struct MockState {
    polls_until_ready: u32,
    operation_state: i64,
    temperature_c: f64,
    wavelength_nm: f64,
    interval_ms: i64,
    range_index: i64,
    analysis_mode: i64,
    analysis: HashMap<i64, i64>,
    wide_mode: i64,
    version: [i64; 4],
    /// Indexed by cMin1, cMin2, cMax1, cMax2, cAvg1, cAvg2.
    amplitudes: [i64; 6],
    axis_x: AxisBuffer,
    axis_y: AxisBuffer,
    null_address: bool,
    queued: HashMap<Entry, VecDeque<RawValue>>,
    calls: Vec<(Entry, Vec<Arg>)>,
}

impl Default for MockState {
    fn default() -> Self {
        let wavelengths: Vec<f64> = (0..64).map(|i| 250.0 + f64::from(i) * 0.5).collect();
        let intensities: Vec<f64> = wavelengths
            .iter()
            .map(|wl| (-((wl - 266.0) / 2.0).powi(2)).exp())
            .collect();
        Self {
            polls_until_ready: 0,
            operation_state: STATE_STOP,
            temperature_c: 24.5,
            wavelength_nm: 266.0,
            interval_ms: 20,
            range_index: 1,
            analysis_mode: 0,
            analysis: HashMap::new(),
            wide_mode: 0,
            version: [6, 3194, 17, 1234],
            amplitudes: [120, 118, 2400, 2380, 1300, 1290],
            axis_x: AxisBuffer::from_f64(&wavelengths),
            axis_y: AxisBuffer::from_f64(&intensities),
            null_address: false,
            queued: HashMap::new(),
            calls: Vec::new(),
        }
    }
}

/// Simulated `wlmData` driver.
#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

/// Inspection handle sharing state with a [`MockDriver`].
#[derive(Debug, Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    /// Create a mock that answers the presence check immediately, measurement stopped.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for inspecting calls and adjusting state after the driver is moved.
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Report "no wavelength meter" for the first `polls` presence checks.
    pub fn with_ready_after(self, polls: u32) -> Self {
        self.state.lock().polls_until_ready = polls;
        self
    }

    /// Never answer the presence check.
    pub fn never_ready(self) -> Self {
        self.with_ready_after(u32::MAX)
    }

    /// Wavelength reported while measuring.
    pub fn with_wavelength(self, wavelength_nm: f64) -> Self {
        self.state.lock().wavelength_nm = wavelength_nm;
        self
    }

    /// Operating temperature in degrees C.
    pub fn with_temperature(self, temperature_c: f64) -> Self {
        self.state.lock().temperature_c = temperature_c;
        self
    }

    /// Initial `GetRange` index.
    pub fn with_range_index(self, index: i64) -> Self {
        self.state.lock().range_index = index;
        self
    }

    /// `GetWLMVersion` parts: type, version, revision, build.
    pub fn with_version(self, version: [i64; 4]) -> Self {
        self.state.lock().version = version;
        self
    }

    /// Start in measurement mode.
    pub fn measuring(self) -> Self {
        self.state.lock().operation_state = 2;
        self
    }

    /// Replace both analysis axes with `f64` samples.
    pub fn with_spectrum(self, wavelengths: &[f64], intensities: &[f64]) -> Self {
        {
            let mut state = self.state.lock();
            state.axis_x = AxisBuffer::from_f64(wavelengths);
            state.axis_y = AxisBuffer::from_f64(intensities);
        }
        self
    }

    /// Serve the intensity axis as 32-bit integers.
    pub fn with_intensity_i32(self, intensities: &[i32]) -> Self {
        self.state.lock().axis_y = AxisBuffer::from_i32(intensities);
        self
    }

    /// Serve the intensity axis as 16-bit integers.
    pub fn with_intensity_i16(self, intensities: &[i16]) -> Self {
        self.state.lock().axis_y = AxisBuffer::from_i16(intensities);
        self
    }

    /// Report an arbitrary item size for the intensity axis.
    pub fn with_intensity_item_size(self, size: i64) -> Self {
        self.state.lock().axis_y.item_size = size;
        self
    }

    /// Return address 0 for analysis data.
    pub fn with_null_address(self) -> Self {
        self.state.lock().null_address = true;
        self
    }
}

impl MockHandle {
    /// Make the next call to `entry` return `value` instead of simulating it.
    ///
    /// `value` must have the entry's return width; otherwise that call fails
    /// with `WidthMismatch`.
    pub fn queue_response(&self, entry: Entry, value: RawValue) {
        self.state
            .lock()
            .queued
            .entry(entry)
            .or_default()
            .push_back(value);
    }

    /// Number of calls to `entry` so far.
    pub fn call_count(&self, entry: Entry) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|(e, _)| *e == entry)
            .count()
    }

    /// Arguments of every call to `entry`, oldest first.
    pub fn calls_to(&self, entry: Entry) -> Vec<Vec<Arg>> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|(e, _)| *e == entry)
            .map(|(_, args)| args.clone())
            .collect()
    }

    /// Entry points called, oldest first.
    pub fn call_sequence(&self) -> Vec<Entry> {
        self.state.lock().calls.iter().map(|(e, _)| *e).collect()
    }

    /// Forget the recorded calls.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Current `GetOperationState` value.
    pub fn operation_state(&self) -> i64 {
        self.state.lock().operation_state
    }

    /// Change the operation state behind the session's back.
    pub fn set_operation_state(&self, state: i64) {
        self.state.lock().operation_state = state;
    }

    /// Last `SetAnalysisMode` argument.
    pub fn analysis_mode(&self) -> i64 {
        self.state.lock().analysis_mode
    }

    /// Last value set for an analysis switch via `SetAnalysis`.
    pub fn analysis_setting(&self, switch: i64) -> Option<i64> {
        self.state.lock().analysis.get(&switch).copied()
    }

    /// Last `SetWideMode` argument.
    pub fn wide_mode(&self) -> i64 {
        self.state.lock().wide_mode
    }

    /// Current measurement interval.
    pub fn interval_ms(&self) -> i64 {
        self.state.lock().interval_ms
    }

    /// Current range index.
    pub fn range_index(&self) -> i64 {
        self.state.lock().range_index
    }
}

impl MockState {
    fn simulate(&mut self, entry: Entry, args: &[Arg]) -> RawValue {
        let arg = |i: usize| args.get(i).copied().map(Arg::as_i64).unwrap_or_default();

        match entry {
            Entry::Instantiate => {
                if arg(0) == INST_CHECK_FOR_WLM {
                    if self.polls_until_ready > 0 {
                        self.polls_until_ready = self.polls_until_ready.saturating_sub(1);
                        RawValue::Int(0)
                    } else {
                        RawValue::Int(1)
                    }
                } else {
                    RawValue::Int(1)
                }
            }
            Entry::ControlWlm => RawValue::Int(RES_NO_ERR),
            Entry::GetOperationState => RawValue::Short(self.operation_state as i16),
            Entry::Operation => {
                self.operation_state = arg(0);
                RawValue::Int(RES_NO_ERR)
            }
            Entry::GetTemperature => RawValue::Double(self.temperature_c),
            Entry::GetWavelength => RawValue::Double(self.measured(self.wavelength_nm)),
            Entry::GetFrequency => {
                RawValue::Double(self.measured(SPEED_OF_LIGHT_NM_THZ / self.wavelength_nm))
            }
            Entry::GetInterval => RawValue::Int(self.interval_ms),
            Entry::SetInterval => {
                self.interval_ms = arg(0);
                RawValue::Int(RES_NO_ERR)
            }
            Entry::GetRange => RawValue::Short(self.range_index as i16),
            Entry::SetRange => {
                self.range_index = arg(0);
                RawValue::Int(RES_NO_ERR)
            }
            Entry::SetAnalysisMode => {
                self.analysis_mode = arg(0);
                RawValue::Int(RES_NO_ERR)
            }
            Entry::SetAnalysis => {
                self.analysis.insert(arg(0), arg(1));
                RawValue::Int(RES_NO_ERR)
            }
            Entry::SetWideMode => {
                self.wide_mode = arg(0);
                RawValue::Int(RES_NO_ERR)
            }
            Entry::GetAnalysisItemSize => {
                RawValue::Int(self.axis(arg(0)).map_or(0, |a| a.item_size))
            }
            Entry::GetAnalysisItemCount => RawValue::Int(self.axis(arg(0)).map_or(0, |a| a.count)),
            Entry::GetAnalysisItemAddress => {
                let address = if self.null_address {
                    0
                } else {
                    self.axis(arg(0)).map_or(0, AxisBuffer::address)
                };
                RawValue::Long(address)
            }
            Entry::GetWlmVersion => {
                let index = usize::try_from(arg(0)).unwrap_or(usize::MAX);
                RawValue::Int(self.version.get(index).copied().unwrap_or(RES_NO_ERR))
            }
            Entry::GetAmplitudeNum => {
                let index = usize::try_from(arg(1)).unwrap_or(usize::MAX);
                RawValue::Int(self.amplitudes.get(index).copied().unwrap_or_default())
            }
            Entry::GetLinewidth => {
                let wl = self.wavelength_nm;
                let value = match arg(0) {
                    RETURN_WAVELENGTH_VAC => wl,
                    RETURN_WAVELENGTH_AIR => wl / AIR_INDEX,
                    RETURN_FREQUENCY => SPEED_OF_LIGHT_NM_THZ / wl,
                    RETURN_WAVENUMBER => 1.0e7 / wl,
                    RETURN_PHOTON_ENERGY => PLANCK_EV_NM / wl,
                    _ => ERR_NO_VALUE,
                };
                RawValue::Double(self.measured(value))
            }
        }
    }

    /// A measured quantity only exists while a measurement runs.
    fn measured(&self, value: f64) -> f64 {
        if self.operation_state == STATE_STOP {
            ERR_NO_VALUE
        } else {
            value
        }
    }

    fn axis(&self, selector: i64) -> Option<&AxisBuffer> {
        match selector {
            SIGNAL_ANALYSIS_X => Some(&self.axis_x),
            SIGNAL_ANALYSIS_Y => Some(&self.axis_y),
            _ => None,
        }
    }
}

impl WlmDriver for MockDriver {
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

        let mut state = self.state.lock();
        state.calls.push((entry, args.to_vec()));
        let queued = state.queued.get_mut(&entry).and_then(VecDeque::pop_front);
        let value = match queued {
            Some(queued) if queued.width() != width => {
                return Err(WlmError::WidthMismatch {
                    entry,
                    expected: queued.width(),
                    requested: width,
                });
            }
            Some(queued) => queued,
            None => state.simulate(entry, args),
        };
        trace!(%entry, ?args, ?value, "MockDriver call");
        Ok(value)
    }

    fn describe(&self) -> String {
        "MockDriver (simulated WS6 + LSA)".to_string()
    }
}
