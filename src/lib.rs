// Latency Calibrator Core - round-trip audio latency measurement
// Probe generation, lock-free sample-accurate capture gate, normalized
// cross-correlation and robust multi-trial aggregation

// Module declarations
pub mod analysis;
pub mod audio;
pub mod calibration;
pub mod config;
pub mod error;
pub mod probe;
pub mod telemetry;

// Re-exports for convenience
pub use analysis::{estimate_lag, LagEstimate, LagSearch};
pub use audio::{AudioBackend, AudioClock, LoopbackBackend, LoopbackConfig};
pub use calibration::{
    aggregate_trials, schedule_aligned_event, schedule_aligned_event_checked, CalibrationOutcome,
    LatencyCalibrator, QualityWarning, Selection, TrialProgress, TrialResult,
};
pub use config::{AppConfig, AudioConfig, CalibrationConfig, ReferenceSource, RobustConfig};
pub use error::{AudioError, CalibrationError, ErrorCode};
pub use probe::{ProbeKind, ProbeSignal};
