//! Configuration file loading

use std::fs;
use std::path::PathBuf;

use latency_calibrator::config::{AppConfig, ReferenceSource};
use latency_calibrator::error::{CalibrationError, ErrorCode};
use latency_calibrator::probe::ProbeKind;

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("latency_calibrator_{}_{}", std::process::id(), name))
}

#[test]
fn test_load_partial_json_keeps_defaults() {
    let path = temp_path("partial.json");
    fs::write(
        &path,
        r#"{
            "calibration": {
                "probe": { "kind": "mls", "mls": { "order": 10 } },
                "high_pass_hz": 0.0,
                "reference_source": "tap"
            },
            "robust": { "trials": 9 }
        }"#,
    )
    .unwrap();

    let config = AppConfig::try_load_from_file(&path).unwrap();
    fs::remove_file(&path).ok();

    assert_eq!(config.calibration.probe.kind, ProbeKind::Mls);
    assert_eq!(config.calibration.probe.mls.order, 10);
    assert_eq!(config.calibration.probe.mls.repetitions, 2);
    assert_eq!(config.calibration.high_pass_hz, 0.0);
    assert_eq!(config.calibration.reference_source, ReferenceSource::Tap);
    assert_eq!(config.robust.trials, 9);
    assert_eq!(config.robust.min_score, 0.2);
    assert_eq!(config.audio.sample_rate, 48_000);
    assert!(config.validate().is_ok());
}

#[test]
fn test_missing_file_reports_config_load() {
    let path = temp_path("missing.json");
    let err = AppConfig::try_load_from_file(&path).unwrap_err();
    assert!(matches!(err, CalibrationError::ConfigLoad { .. }));
    assert_eq!(err.code(), 2004);

    // The lenient loader falls back to defaults
    let config = AppConfig::load_from_file(&path);
    assert_eq!(config.robust.trials, 6);
}

#[test]
fn test_malformed_json_reports_config_load() {
    let path = temp_path("malformed.json");
    fs::write(&path, "{ not json").unwrap();
    let err = AppConfig::try_load_from_file(&path).unwrap_err();
    fs::remove_file(&path).ok();
    assert!(matches!(err, CalibrationError::ConfigLoad { .. }));
}

#[test]
fn test_loaded_config_is_validated_separately() {
    let path = temp_path("invalid.json");
    fs::write(&path, r#"{ "calibration": { "probe": { "kind": "mls", "mls": { "order": 1 } } } }"#)
        .unwrap();
    let config = AppConfig::try_load_from_file(&path).unwrap();
    fs::remove_file(&path).ok();

    let err = config.validate().unwrap_err();
    assert!(matches!(err, CalibrationError::InvalidParameter { .. }));
    assert_eq!(err.code(), 2001);
}
