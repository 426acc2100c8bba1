// Calibration module - round-trip latency measurement workflow
//
// This module provides the coordination-side components:
// 1. CaptureWindow / CaptureAssembler: per-trial timeline and buffer assembly
// 2. LatencyCalibrator: single trials and robust multi-trial calibration
// 3. schedule_aligned_event: turns a measured latency into output start times
//
// The calibration workflow:
// 1. Open a backend (loopback simulation or cpal devices)
// 2. Run calibrate / calibrate_robust
// 3. Schedule future output events with the resulting LagEstimate

pub mod progress;
pub mod result;
pub mod robust;
pub mod schedule;
pub mod trial;
pub mod window;

pub use progress::TrialProgress;
pub use result::{CalibrationOutcome, QualityWarning, Selection, TrialResult};
pub use robust::{aggregate_trials, AmplitudeController};
pub use schedule::{schedule_aligned_event, schedule_aligned_event_checked, SCHEDULING_MARGIN_SECS};
pub use trial::{analyze_capture, LatencyCalibrator, TrialRecord};
pub use window::{CaptureAssembler, CaptureWindow, CapturedBuffer};
