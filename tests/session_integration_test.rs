//! InstrumentSession against the simulated wavelength meter.
//!
//! Every test opens the process-wide session, so all of them run serially.

use std::time::{Duration, Instant};

use serial_test::serial;
use wlm_daq::constants::{load_header, ResolvePolicy};
use wlm_daq::driver::{Entry, MockDriver, RawValue};
use wlm_daq::{InstrumentSession, RangeLookup, SessionOptions, WavelengthRangeTable, WlmError, WlmResult};

const FIXTURE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/wlmData.h");

fn fast_options() -> SessionOptions {
    SessionOptions {
        settle_delay: Duration::from_millis(5),
        handshake_timeout: Duration::from_millis(250),
        handshake_initial_backoff: Duration::from_millis(1),
        handshake_max_backoff: Duration::from_millis(10),
        ..SessionOptions::default()
    }
}

fn connect_with(driver: MockDriver, options: SessionOptions) -> WlmResult<InstrumentSession<MockDriver>> {
    let report = load_header(FIXTURE, ResolvePolicy::Strict)?;
    InstrumentSession::connect(driver, report, WavelengthRangeTable::default(), options)
}

fn connect(driver: MockDriver) -> InstrumentSession<MockDriver> {
    connect_with(driver, fast_options()).unwrap()
}

#[test]
#[serial]
fn test_read_error_is_named() {
    let driver = MockDriver::new();
    let handle = driver.handle();
    let session = connect(driver);

    handle.queue_response(Entry::GetTemperature, RawValue::Double(-4.0));
    let err = session.temperature().unwrap_err();
    assert!(err.is_recoverable());
    assert_eq!(err.instrument_error_name(), Some("ErrBigSignal"));

    // the next reading is legitimate again
    assert_eq!(session.temperature().unwrap(), 24.5);
}

#[test]
#[serial]
fn test_set_results_are_classified() {
    let driver = MockDriver::new();
    let handle = driver.handle();
    let session = connect(driver);

    handle.queue_response(Entry::Operation, RawValue::Int(0));
    session.set_active(true).unwrap();

    handle.queue_response(Entry::Operation, RawValue::Int(-1));
    let err = session.set_active(true).unwrap_err();
    assert!(matches!(err, WlmError::Instrument { ref name, code: -1 } if name == "ResERR_WlmMissing"));
}

#[test]
#[serial]
fn test_range_lookup() {
    let session = connect(MockDriver::new().with_range_index(1));
    assert_eq!(
        session.range().unwrap(),
        RangeLookup::Found {
            index: 1,
            min_nm: 250.0,
            max_nm: 330.0
        }
    );
    drop(session);

    let session = connect(MockDriver::new().with_range_index(9));
    let lookup = session.range().unwrap();
    assert_eq!(lookup, RangeLookup::NotFound { index: 9 });
    assert_eq!(lookup.to_string(), "range not found: 9");
}

#[test]
#[serial]
fn test_set_range_and_interval() {
    let driver = MockDriver::new();
    let handle = driver.handle();
    let session = connect(driver);

    session.set_range(0).unwrap();
    assert_eq!(handle.range_index(), 0);
    assert!(session.range().unwrap().is_found());

    assert_eq!(session.interval().unwrap(), 20);
    session.set_interval(100).unwrap();
    assert_eq!(handle.interval_ms(), 100);
    assert_eq!(session.interval().unwrap(), 100);
}

#[test]
#[serial]
fn test_spectrum_doubles() {
    let driver = MockDriver::new().with_spectrum(&[400.0, 401.0, 402.0], &[1.0, 5.0, 2.0]);
    let handle = driver.handle();
    let session = connect(driver);

    let spectrum = session.spectrum().unwrap();
    let points: Vec<(f64, f64)> = spectrum
        .points
        .iter()
        .map(|p| (p.wavelength_nm, p.intensity))
        .collect();
    assert_eq!(points, vec![(400.0, 1.0), (401.0, 5.0), (402.0, 2.0)]);
    assert_eq!(spectrum.peak().map(|p| p.wavelength_nm), Some(401.0));

    assert_eq!(handle.analysis_mode(), 1);
    assert_eq!(handle.analysis_setting(4), Some(1));
    assert_eq!(handle.wide_mode(), 1);
}

#[test]
#[serial]
fn test_spectrum_integer_intensities() {
    let session = connect(
        MockDriver::new()
            .with_spectrum(&[500.0, 500.5], &[0.0, 0.0])
            .with_intensity_i16(&[-3, 1200]),
    );
    let spectrum = session.spectrum().unwrap();
    assert_eq!(spectrum.points[0].intensity, -3.0);
    assert_eq!(spectrum.points[1].intensity, 1200.0);
    drop(session);

    let session = connect(
        MockDriver::new()
            .with_spectrum(&[500.0, 500.5], &[0.0, 0.0])
            .with_intensity_i32(&[70_000, 5]),
    );
    let spectrum = session.spectrum().unwrap();
    assert_eq!(spectrum.points[0].intensity, 70_000.0);
}

#[test]
#[serial]
fn test_spectrum_mismatched_axes_truncate() {
    let session = connect(MockDriver::new().with_spectrum(&[1.0, 2.0, 3.0, 4.0], &[10.0, 20.0]));
    let spectrum = session.spectrum().unwrap();
    assert_eq!(spectrum.len(), 2);
    assert_eq!(spectrum.points[1].wavelength_nm, 2.0);
}

#[test]
#[serial]
fn test_spectrum_decoding_failures() {
    let session = connect(MockDriver::new().with_intensity_item_size(3));
    let err = session.spectrum().unwrap_err();
    assert!(matches!(err, WlmError::UnsupportedItemSize { axis: 'Y', size: 3 }));
    drop(session);

    let session = connect(MockDriver::new().with_null_address());
    let err = session.spectrum().unwrap_err();
    assert!(matches!(err, WlmError::NullAddress { axis: 'X' }));
}

#[test]
#[serial]
fn test_lazy_activation_starts_once() {
    let driver = MockDriver::new().with_wavelength(780.24);
    let handle = driver.handle();
    let session = connect(driver);

    assert!(!session.is_active().unwrap());
    assert_eq!(session.wavelength().unwrap(), 780.24);
    assert_eq!(handle.call_count(Entry::Operation), 1);
    assert_eq!(handle.calls_to(Entry::Operation)[0][0].as_i64(), 2);

    let frequency = session.frequency().unwrap();
    assert!((frequency - 299_792.458 / 780.24).abs() < 1e-9);
    assert_eq!(handle.call_count(Entry::Operation), 1);
}

#[test]
#[serial]
fn test_set_active_when_active_does_not_wait() {
    let options = SessionOptions {
        settle_delay: Duration::from_secs(5),
        ..fast_options()
    };
    let driver = MockDriver::new().measuring();
    let handle = driver.handle();
    let session = connect_with(driver, options).unwrap();

    let started = Instant::now();
    session.set_active(true).unwrap();
    session.set_active(true).unwrap();
    assert!(session.wavelength().is_ok());
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(handle.operation_state(), 2);

    session.set_active(false).unwrap();
    assert_eq!(handle.operation_state(), 0);
    assert!(!session.is_active().unwrap());
}

#[test]
#[serial]
fn test_wavelength_without_signal_is_no_value() {
    let driver = MockDriver::new().measuring();
    let handle = driver.handle();
    let session = connect(driver);

    handle.queue_response(Entry::GetWavelength, RawValue::Double(0.0));
    let err = session.wavelength().unwrap_err();
    assert_eq!(err.instrument_error_name(), Some("ErrNoValue"));
}

#[test]
#[serial]
fn test_version_and_amplitude() {
    let session = connect(MockDriver::new().with_version([7, 4212, 3, 99]));
    let version = session.version().unwrap();
    assert_eq!(version.kind, 7);
    assert_eq!(version.build, 99);

    let amplitudes = session.amplitude().unwrap();
    assert_eq!(amplitudes.len(), session.num_channels() as usize);
    assert_eq!(amplitudes[&1].min, 120);
    assert_eq!(amplitudes[&1].max, 2400);
    assert_eq!(amplitudes[&2].avg, 1290);
}

#[test]
#[serial]
fn test_zero_amplitude_is_a_reading() {
    let driver = MockDriver::new();
    let handle = driver.handle();
    let session = connect(driver);

    handle.queue_response(Entry::GetAmplitudeNum, RawValue::Int(0));
    let amplitudes = session.amplitude().unwrap();
    assert_eq!(amplitudes[&1].min, 0);
    assert_eq!(amplitudes[&1].max, 2400);

    handle.queue_response(Entry::GetAmplitudeNum, RawValue::Int(-5));
    let err = session.amplitude().unwrap_err();
    assert_eq!(err.instrument_error_name(), Some("ErrWlmMissing"));
}

#[test]
#[serial]
fn test_linewidth() {
    let session = connect(MockDriver::new().with_wavelength(500.0));
    let lw = session.linewidth().unwrap();
    assert_eq!(lw.vacuum_wavelength_nm, 500.0);
    assert!(lw.air_wavelength_nm < 500.0);
    assert!((lw.wavenumber - 20_000.0).abs() < 1e-9);
    assert!(lw.photon_energy_ev > 2.4 && lw.photon_energy_ev < 2.5);
}

#[test]
#[serial]
fn test_handshake_timeout() {
    let started = Instant::now();
    let err = connect_with(MockDriver::new().never_ready(), fast_options()).unwrap_err();
    match err {
        WlmError::DeviceNotResponding { waited } => assert!(waited >= Duration::from_millis(250)),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
#[serial]
fn test_only_one_session_per_process() {
    let first = connect(MockDriver::new());
    let err = connect_with(MockDriver::new(), fast_options()).unwrap_err();
    assert!(matches!(err, WlmError::SessionBusy));

    drop(first);
    let _second = connect(MockDriver::new());
}

#[test]
#[serial]
fn test_inspection_accessors() {
    let session = connect(MockDriver::new());
    assert_eq!(session.constants().get("cMeasurement"), Some(2));
    assert_eq!(session.catalog().set_errors().len(), 10);
    assert_eq!(session.range_table().len(), 3);
}
