//! Resolution of a vendor-layout `wlmData.h` into constants and error codes.

use std::io::Write;

use wlm_daq::catalog::Channel;
use wlm_daq::constants::{load_header, resolve_header, ResolvePolicy};
use wlm_daq::WlmError;

const FIXTURE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/wlmData.h");

#[test]
fn test_fixture_resolves_strict() {
    let report = load_header(FIXTURE, ResolvePolicy::Strict).unwrap();
    let ns = &report.namespace;

    assert!(report.skipped.is_empty());
    assert_eq!(ns.get("cInstCheckForWLM"), Some(-1));
    assert_eq!(ns.get("cInstReturnMode"), Some(0));
    assert_eq!(ns.get("cCtrlStartMeasurement"), Some(2));
    assert_eq!(ns.get("cCtrlWLMWait"), Some(16));
    assert_eq!(ns.get("cSignalAnalysisX"), Some(4));
    assert_eq!(ns.get("cSignalAnalysisY"), Some(5));
    assert_eq!(ns.get("ErrTempNotAvailable"), Some(-1006));
    assert_eq!(ns.get("ErrMaxErr"), Some(-15));
}

#[test]
fn test_declarations_before_marker_are_ignored() {
    let report = load_header(FIXTURE, ResolvePolicy::Strict).unwrap();
    assert!(!report.namespace.contains("cNeverSeen"));
    assert_eq!(report.namespace.iter().next().map(|(name, _)| name), Some("cInstCheckForWLM"));
}

#[test]
fn test_fixture_catalog_partitions() {
    let report = load_header(FIXTURE, ResolvePolicy::Strict).unwrap();
    let catalog = &report.catalog;

    let read: Vec<&str> = catalog.read_errors().iter().map(|c| c.name.as_str()).collect();
    assert!(read.contains(&"ErrBigSignal"));
    assert!(read.contains(&"ErrTempWlmMissing"));
    assert!(!read.contains(&"InfNothingChanged"));
    assert!(read.iter().all(|name| name.starts_with("Err")));

    let set: Vec<&str> = catalog.set_errors().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(set.len(), 10);
    assert!(!set.contains(&"ResERR_NoErr"));
    assert!(set.iter().all(|name| name.starts_with("ResERR")));
}

#[test]
fn test_fixture_classification() {
    let report = load_header(FIXTURE, ResolvePolicy::Strict).unwrap();
    let catalog = &report.catalog;

    let err = catalog.classify_f64(-4.0, Channel::Read).unwrap_err();
    assert_eq!(err.instrument_error_name(), Some("ErrBigSignal"));

    // ErrTemperature is declared before its aliases
    let err = catalog.classify_f64(-1000.0, Channel::Read).unwrap_err();
    assert_eq!(err.instrument_error_name(), Some("ErrTemperature"));

    assert_eq!(catalog.classify(0, Channel::Set).unwrap(), 0);
    let err = catalog.classify(-1, Channel::Set).unwrap_err();
    assert_eq!(err.instrument_error_name(), Some("ResERR_WlmMissing"));

    assert_eq!(catalog.classify_f64(780.241, Channel::Read).unwrap(), 780.241);
}

#[test]
fn test_shared_value_is_named_per_channel() {
    let text = "// Constants\n\
                const int ErrBigSignal = 0x1;\n\
                const int ResERR_NoErr = 0;\n\
                const int ResERR_WlmMissing = 1;\n";
    let report = resolve_header(text, ResolvePolicy::Strict).unwrap();
    let catalog = &report.catalog;

    let err = catalog.classify(1, Channel::Read).unwrap_err();
    assert_eq!(err.instrument_error_name(), Some("ErrBigSignal"));
    let err = catalog.classify(1, Channel::Set).unwrap_err();
    assert_eq!(err.instrument_error_name(), Some("ResERR_WlmMissing"));

    assert_eq!(catalog.classify(0, Channel::Set).unwrap(), 0);
    assert_eq!(catalog.classify(0, Channel::Read).unwrap(), 0);
}

#[test]
fn test_broken_header_strict_and_lenient() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "// Constants\n\
         const int cGood = 0x1A;\n\
         const int cBad = cMissing + 1;\n\
         const int cAlsoGood = cGood + 010;"
    )
    .unwrap();

    let err = load_header(file.path(), ResolvePolicy::Strict).unwrap_err();
    assert!(matches!(err, WlmError::MalformedDeclaration { line: 3, .. }));

    let report = load_header(file.path(), ResolvePolicy::Lenient).unwrap();
    assert_eq!(report.namespace.get("cGood"), Some(26));
    assert_eq!(report.namespace.get("cAlsoGood"), Some(34));
    assert_eq!(report.skipped.len(), 1);
    assert!(report.skipped[0].reason.contains("cMissing"));
}

#[test]
fn test_missing_header() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_header(dir.path().join("wlmData.h"), ResolvePolicy::Strict).unwrap_err();
    assert!(matches!(err, WlmError::HeaderNotFound { .. }));
}

#[test]
fn test_resolution_is_deterministic() {
    let text = std::fs::read_to_string(FIXTURE).unwrap();
    let a = resolve_header(&text, ResolvePolicy::Strict).unwrap();
    let b = resolve_header(&text, ResolvePolicy::Strict).unwrap();
    assert_eq!(a.namespace, b.namespace);
    assert_eq!(a.catalog, b.catalog);
}
