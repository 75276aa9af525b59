//! Opening a session from a configuration file.

use std::io::Write;

use serial_test::serial;
use wlm_daq::config::WlmConfig;
use wlm_daq::constants::ResolvePolicy;
use wlm_daq::driver::MockDriver;
use wlm_daq::{InstrumentSession, RangeLookup, WlmError};

const FIXTURE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/wlmData.h");

fn write_config(body: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(body.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_open_from_config_file() {
    let file = write_config(&format!(
        r#"
        [paths]
        header = "{FIXTURE}"

        [session]
        settle_delay_ms = 1
        handshake_initial_backoff_ms = 1
        handshake_max_backoff_ms = 5
        channels = 1

        [ranges]
        table = [[1, 600.0, 1100.0], [2, 1000.0, 1700.0]]
        "#
    ));

    let config = WlmConfig::load_from(file.path()).unwrap();
    config.validate().unwrap();
    assert_eq!(config.session.resolve_policy, ResolvePolicy::Strict);

    let session = InstrumentSession::open(MockDriver::new().with_range_index(1), &config).unwrap();
    assert_eq!(session.options().channels, 1);
    assert_eq!(session.amplitude().unwrap().len(), 1);
    assert_eq!(
        session.range().unwrap(),
        RangeLookup::Found {
            index: 1,
            min_nm: 600.0,
            max_nm: 1100.0
        }
    );
}

#[test]
#[serial]
fn test_open_with_missing_header() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = WlmConfig::default();
    config.paths.header = dir.path().join("wlmData.h");

    let err = InstrumentSession::open(MockDriver::new(), &config).unwrap_err();
    assert!(matches!(err, WlmError::HeaderNotFound { .. }));
}

#[test]
fn test_duplicate_range_index_rejected() {
    let file = write_config(
        r#"
        [ranges]
        table = [[0, 190.0, 260.0], [0, 250.0, 330.0]]
        "#,
    );
    let config = WlmConfig::load_from(file.path()).unwrap();
    assert!(matches!(config.validate(), Err(WlmError::Configuration(_))));
}

#[cfg(feature = "storage_csv")]
#[test]
#[serial]
fn test_spectrum_csv_export() {
    let mut config = WlmConfig::default();
    config.paths.header = FIXTURE.into();
    config.session.handshake_initial_backoff_ms = 1;

    let driver = MockDriver::new().with_spectrum(&[400.0, 400.5], &[0.25, 0.75]);
    let session = InstrumentSession::open(driver, &config).unwrap();
    let spectrum = session.spectrum().unwrap();

    let out = tempfile::NamedTempFile::new().unwrap();
    spectrum.write_csv(out.reopen().unwrap()).unwrap();
    let text = std::fs::read_to_string(out.path()).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("wavelength_nm,intensity"));
    assert_eq!(lines.next(), Some("400.0,0.25"));
    assert_eq!(lines.next(), Some("400.5,0.75"));
}
