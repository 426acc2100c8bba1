//! Configuration for latency calibration
//!
//! All parameters are plain serde structs with defaults, so a host can load
//! them from a JSON file and tweak probe shape, window lengths or acceptance
//! thresholds without recompiling. Every struct validates itself before any
//! hardware is touched; out-of-range values are reported as
//! [`CalibrationError::InvalidParameter`].

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::audio::buffer_pool::DEFAULT_BUFFER_COUNT;
use crate::error::CalibrationError;
use crate::probe::ProbeKind;
use crate::probe::mls::{MAX_MLS_ORDER, MIN_MLS_ORDER};

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub calibration: CalibrationConfig,
    pub robust: RobustConfig,
    pub audio: AudioConfig,
}

/// Swept-tone probe shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChirpConfig {
    /// Sweep start frequency in Hz
    pub start_hz: f64,
    /// Sweep end frequency in Hz (must be above `start_hz` and below Nyquist)
    pub end_hz: f64,
    /// Sweep duration in milliseconds
    pub duration_ms: f64,
}

impl Default for ChirpConfig {
    fn default() -> Self {
        Self {
            start_hz: 200.0,
            end_hz: 8_000.0,
            duration_ms: 200.0,
        }
    }
}

/// Maximal-length sequence probe shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MlsConfig {
    /// Register length; the period is `2^order - 1` samples
    pub order: u32,
    /// Number of back-to-back periods
    pub repetitions: u32,
    /// Initial register state, must be non-zero within `order` bits
    pub seed: u32,
}

impl Default for MlsConfig {
    fn default() -> Self {
        Self {
            order: 12,
            repetitions: 2,
            seed: 1,
        }
    }
}

/// Probe generation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub kind: ProbeKind,
    /// Peak amplitude of the generated buffer, full scale = 1.0
    pub amplitude: f32,
    /// Linear fade applied to both edges (at least one sample)
    pub fade_ms: f64,
    pub chirp: ChirpConfig,
    pub mls: MlsConfig,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            kind: ProbeKind::Chirp,
            amplitude: 0.5,
            fade_ms: 5.0,
            chirp: ChirpConfig::default(),
            mls: MlsConfig::default(),
        }
    }
}

impl ProbeConfig {
    pub fn validate(&self, sample_rate: u32) -> Result<(), CalibrationError> {
        check_amplitude("probe.amplitude", self.amplitude)?;
        if !(self.fade_ms >= 0.0 && self.fade_ms.is_finite()) {
            return Err(CalibrationError::invalid(
                "probe.fade_ms",
                format!("must be a non-negative duration (got {})", self.fade_ms),
            ));
        }

        match self.kind {
            ProbeKind::Chirp => {
                let nyquist = sample_rate as f64 / 2.0;
                let chirp = &self.chirp;
                check_positive("probe.chirp.duration_ms", chirp.duration_ms)?;
                if !(chirp.start_hz > 0.0 && chirp.start_hz < nyquist) {
                    return Err(CalibrationError::invalid(
                        "probe.chirp.start_hz",
                        format!("must lie in (0, {}) Hz (got {})", nyquist, chirp.start_hz),
                    ));
                }
                if !(chirp.end_hz > chirp.start_hz && chirp.end_hz < nyquist) {
                    return Err(CalibrationError::invalid(
                        "probe.chirp.end_hz",
                        format!(
                            "must lie in ({}, {}) Hz (got {})",
                            chirp.start_hz, nyquist, chirp.end_hz
                        ),
                    ));
                }
            }
            ProbeKind::Mls => {
                let mls = &self.mls;
                if !(MIN_MLS_ORDER..=MAX_MLS_ORDER).contains(&mls.order) {
                    return Err(CalibrationError::invalid(
                        "probe.mls.order",
                        format!(
                            "must be within {}..={} (got {})",
                            MIN_MLS_ORDER, MAX_MLS_ORDER, mls.order
                        ),
                    ));
                }
                if mls.repetitions == 0 {
                    return Err(CalibrationError::invalid(
                        "probe.mls.repetitions",
                        "must be at least 1",
                    ));
                }
                let mask = (1u32 << mls.order) - 1;
                if mls.seed & mask == 0 {
                    return Err(CalibrationError::invalid(
                        "probe.mls.seed",
                        format!("must be non-zero within {} bits (got {})", mls.order, mls.seed),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Which signal the captured buffer is correlated against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceSource {
    /// The exact probe buffer that was scheduled, placed on the window timeline
    #[default]
    Generated,
    /// The parallel reference tap recorded by the gate, when the backend has one
    Tap,
}

/// Single-trial calibration parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub probe: ProbeConfig,
    /// Recording before the probe is expected
    pub pre_roll_ms: f64,
    /// Recording after the probe, to catch the delayed arrival
    pub post_roll_ms: f64,
    /// Largest plausible round trip searched by the estimator
    pub max_lag_ms: f64,
    /// Also search negative lags (diagnostics only)
    pub allow_negative_lag: bool,
    /// High-pass cutoff applied after capture; 0 disables the filter
    pub high_pass_hz: f64,
    /// Distance between "now" and the start of the capture window
    pub schedule_lead_ms: f64,
    /// Slack added to the window length for the completion wait
    pub capture_timeout_ms: f64,
    pub reference_source: ReferenceSource,
    /// Scores below this are flagged as low confidence
    pub low_score_warning: f64,
    /// Lags above this are flagged as implausible
    pub implausible_lag_ms: f64,
    /// Peak magnitude at or above this counts as clipped
    pub clip_threshold: f32,
    /// RMS below this counts as too quiet
    pub quiet_rms: f32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            probe: ProbeConfig::default(),
            pre_roll_ms: 100.0,
            post_roll_ms: 400.0,
            max_lag_ms: 350.0,
            allow_negative_lag: false,
            high_pass_hz: 150.0,
            schedule_lead_ms: 100.0,
            capture_timeout_ms: 1_000.0,
            reference_source: ReferenceSource::Generated,
            low_score_warning: 0.3,
            implausible_lag_ms: 300.0,
            clip_threshold: 0.98,
            quiet_rms: 0.005,
        }
    }
}

impl CalibrationConfig {
    pub fn validate(&self, sample_rate: u32) -> Result<(), CalibrationError> {
        if sample_rate == 0 {
            return Err(CalibrationError::invalid("sample_rate", "must be positive"));
        }
        self.probe.validate(sample_rate)?;
        check_non_negative("pre_roll_ms", self.pre_roll_ms)?;
        check_positive("post_roll_ms", self.post_roll_ms)?;
        check_positive("max_lag_ms", self.max_lag_ms)?;
        check_non_negative("schedule_lead_ms", self.schedule_lead_ms)?;
        check_non_negative("capture_timeout_ms", self.capture_timeout_ms)?;
        check_positive("implausible_lag_ms", self.implausible_lag_ms)?;

        let nyquist = sample_rate as f64 / 2.0;
        if !(self.high_pass_hz >= 0.0 && self.high_pass_hz < nyquist) {
            return Err(CalibrationError::invalid(
                "high_pass_hz",
                format!("must lie in [0, {}) Hz (got {})", nyquist, self.high_pass_hz),
            ));
        }
        if !(-1.0..=1.0).contains(&self.low_score_warning) {
            return Err(CalibrationError::invalid(
                "low_score_warning",
                format!("must lie in [-1, 1] (got {})", self.low_score_warning),
            ));
        }
        check_amplitude("clip_threshold", self.clip_threshold)?;
        if !(self.quiet_rms >= 0.0 && self.quiet_rms < 1.0) {
            return Err(CalibrationError::invalid(
                "quiet_rms",
                format!("must lie in [0, 1) (got {})", self.quiet_rms),
            ));
        }
        Ok(())
    }
}

/// Multi-trial aggregation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobustConfig {
    /// Number of sequential trials
    pub trials: usize,
    /// Minimum score for a trial to count as valid
    pub min_score: f64,
    /// Adapt the probe amplitude between trials
    pub adapt_amplitude: bool,
    /// Multiplier applied after a clipped trial
    pub amplitude_down: f32,
    /// Multiplier applied after a too-quiet trial
    pub amplitude_up: f32,
    pub min_amplitude: f32,
    pub max_amplitude: f32,
    /// Silence between trials so echoes of one probe do not leak into the next
    pub inter_trial_gap_ms: u64,
}

impl Default for RobustConfig {
    fn default() -> Self {
        Self {
            trials: 6,
            min_score: 0.2,
            adapt_amplitude: true,
            amplitude_down: 0.7,
            amplitude_up: 1.5,
            min_amplitude: 0.02,
            max_amplitude: 0.95,
            inter_trial_gap_ms: 50,
        }
    }
}

impl RobustConfig {
    pub fn validate(&self) -> Result<(), CalibrationError> {
        if self.trials == 0 {
            return Err(CalibrationError::invalid("robust.trials", "must be at least 1"));
        }
        if !(-1.0..=1.0).contains(&self.min_score) {
            return Err(CalibrationError::invalid(
                "robust.min_score",
                format!("must lie in [-1, 1] (got {})", self.min_score),
            ));
        }
        if !(self.amplitude_down > 0.0 && self.amplitude_down < 1.0) {
            return Err(CalibrationError::invalid(
                "robust.amplitude_down",
                format!("must lie in (0, 1) (got {})", self.amplitude_down),
            ));
        }
        if !(self.amplitude_up > 1.0 && self.amplitude_up.is_finite()) {
            return Err(CalibrationError::invalid(
                "robust.amplitude_up",
                format!("must be greater than 1 (got {})", self.amplitude_up),
            ));
        }
        check_amplitude("robust.min_amplitude", self.min_amplitude)?;
        check_amplitude("robust.max_amplitude", self.max_amplitude)?;
        if self.min_amplitude > self.max_amplitude {
            return Err(CalibrationError::invalid(
                "robust.min_amplitude",
                format!(
                    "must not exceed max_amplitude ({} > {})",
                    self.min_amplitude, self.max_amplitude
                ),
            ));
        }
        Ok(())
    }
}

/// Audio transport sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate requested from the device
    pub sample_rate: u32,
    /// Frames per callback block
    pub block_size: usize,
    /// Pre-allocated chunk buffers shared by the gate and the coordinator
    pub chunk_pool_size: usize,
    /// Capacity of the gate event queue
    pub event_queue_capacity: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            block_size: 128,
            chunk_pool_size: DEFAULT_BUFFER_COUNT,
            event_queue_capacity: DEFAULT_BUFFER_COUNT,
        }
    }
}

impl AudioConfig {
    pub fn validate(&self) -> Result<(), CalibrationError> {
        if self.sample_rate == 0 {
            return Err(CalibrationError::invalid("audio.sample_rate", "must be positive"));
        }
        if self.block_size == 0 {
            return Err(CalibrationError::invalid("audio.block_size", "must be positive"));
        }
        if self.chunk_pool_size < 2 || self.event_queue_capacity < 2 {
            return Err(CalibrationError::invalid(
                "audio.chunk_pool_size",
                "pool and event queue need room for at least two buffers",
            ));
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load configuration from a JSON file, falling back to defaults
    ///
    /// Read and parse failures are logged and replaced by the default
    /// configuration so a missing file never blocks calibration.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match Self::try_load_from_file(&path) {
            Ok(config) => {
                log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                config
            }
            Err(err) => {
                log::warn!("[Config] {}. Using defaults.", err);
                Self::default()
            }
        }
    }

    /// Load configuration from a JSON file, reporting failures
    pub fn try_load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CalibrationError> {
        let display = path.as_ref().display().to_string();
        let contents = fs::read_to_string(&path).map_err(|err| CalibrationError::ConfigLoad {
            path: display.clone(),
            reason: err.to_string(),
        })?;
        serde_json::from_str(&contents).map_err(|err| CalibrationError::ConfigLoad {
            path: display,
            reason: err.to_string(),
        })
    }

    pub fn validate(&self) -> Result<(), CalibrationError> {
        self.audio.validate()?;
        self.calibration.validate(self.audio.sample_rate)?;
        self.robust.validate()
    }
}

fn check_positive(name: &str, value: f64) -> Result<(), CalibrationError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(CalibrationError::invalid(
            name,
            format!("must be a positive duration (got {})", value),
        ))
    }
}

fn check_non_negative(name: &str, value: f64) -> Result<(), CalibrationError> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(CalibrationError::invalid(
            name,
            format!("must be a non-negative duration (got {})", value),
        ))
    }
}

fn check_amplitude(name: &str, value: f32) -> Result<(), CalibrationError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(CalibrationError::invalid(
            name,
            format!("must lie in (0, 1] (got {})", value),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.robust.trials, 6);
        assert_eq!(config.robust.min_score, 0.2);
        assert_eq!(config.calibration.high_pass_hz, 150.0);
        assert_eq!(config.calibration.clip_threshold, 0.98);
    }

    #[test]
    fn test_json_roundtrip() {
        let config = AppConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.calibration, config.calibration);
        assert_eq!(parsed.robust, config.robust);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "calibration": { "max_lag_ms": 120.0, "probe": { "kind": "mls" } } }"#;
        let parsed: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.calibration.max_lag_ms, 120.0);
        assert_eq!(parsed.calibration.probe.kind, ProbeKind::Mls);
        assert_eq!(parsed.calibration.pre_roll_ms, 100.0);
        assert_eq!(parsed.robust.trials, 6);
    }

    #[test]
    fn test_mls_order_out_of_range_rejected() {
        let mut config = CalibrationConfig::default();
        config.probe.kind = ProbeKind::Mls;
        for order in [0, 1, 21, 32] {
            config.probe.mls.order = order;
            match config.validate(48_000) {
                Err(CalibrationError::InvalidParameter { name, .. }) => {
                    assert_eq!(name, "probe.mls.order");
                }
                other => panic!("order {} should be rejected, got {:?}", order, other),
            }
        }
    }

    #[test]
    fn test_zero_mls_seed_rejected() {
        let mut config = CalibrationConfig::default();
        config.probe.kind = ProbeKind::Mls;
        config.probe.mls.order = 4;
        config.probe.mls.seed = 0b1_0000; // masked to zero within 4 bits
        assert!(config.validate(48_000).is_err());
    }

    #[test]
    fn test_non_positive_durations_rejected() {
        let mut config = CalibrationConfig::default();
        config.post_roll_ms = 0.0;
        assert!(config.validate(48_000).is_err());

        let mut config = CalibrationConfig::default();
        config.probe.chirp.duration_ms = -5.0;
        assert!(config.validate(48_000).is_err());

        let mut config = CalibrationConfig::default();
        config.max_lag_ms = f64::NAN;
        assert!(config.validate(48_000).is_err());
    }

    #[test]
    fn test_chirp_bounds_checked_against_nyquist() {
        let mut config = CalibrationConfig::default();
        config.probe.chirp.end_hz = 30_000.0;
        assert!(config.validate(48_000).is_err());

        config.probe.chirp.end_hz = 100.0; // below start
        assert!(config.validate(48_000).is_err());
    }

    #[test]
    fn test_high_pass_can_be_disabled() {
        let mut config = CalibrationConfig::default();
        config.high_pass_hz = 0.0;
        assert!(config.validate(48_000).is_ok());
    }

    #[test]
    fn test_robust_validation() {
        let mut robust = RobustConfig::default();
        robust.trials = 0;
        assert!(robust.validate().is_err());

        let mut robust = RobustConfig::default();
        robust.min_amplitude = 0.9;
        robust.max_amplitude = 0.5;
        assert!(robust.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_falls_back_to_defaults() {
        let config = AppConfig::load_from_file("/nonexistent/latency_config.json");
        assert_eq!(config.robust.trials, 6);

        match AppConfig::try_load_from_file("/nonexistent/latency_config.json") {
            Err(CalibrationError::ConfigLoad { path, .. }) => {
                assert!(path.contains("latency_config.json"));
            }
            other => panic!("Expected ConfigLoad error, got {:?}", other),
        }
    }
}
