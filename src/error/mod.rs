// Error types for the latency calibrator
//
// This module defines the hard-failure error types for audio acquisition and
// calibration setup. Numeric edge cases inside estimation never surface here:
// they degrade to zero-confidence estimates and advisory quality warnings.

mod audio;
mod calibration;

pub use audio::{log_audio_error, AudioError};
pub use calibration::{log_calibration_error, CalibrationError};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, so hosts can map failures without matching
/// on every variant.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
