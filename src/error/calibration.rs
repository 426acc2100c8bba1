// Calibration error types

use crate::error::{AudioError, ErrorCode};
use log::error;
use std::fmt;

/// Log a calibration error with structured context
pub fn log_calibration_error(err: &CalibrationError, context: &str) {
    error!(
        "Calibration error in {}: code={}, component=LatencyCalibrator, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Calibration errors that abort the whole calibration
///
/// Only invalid parameters and acquisition failures are fatal. Weak signals,
/// low confidence and trials without valid results are reported on the
/// returned outcome instead.
///
/// Error code range: 2001-2004
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// A configuration value is out of range; raised before touching hardware
    InvalidParameter { name: String, reason: String },

    /// The audio device could not be used
    Acquisition(AudioError),

    /// The computed output time already lies in the past
    ScheduleInPast { output_time: f64, now: f64 },

    /// A configuration file could not be read or parsed
    ConfigLoad { path: String, reason: String },
}

impl CalibrationError {
    pub(crate) fn invalid(name: &str, reason: impl Into<String>) -> Self {
        CalibrationError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

impl ErrorCode for CalibrationError {
    fn code(&self) -> i32 {
        match self {
            CalibrationError::InvalidParameter { .. } => 2001,
            CalibrationError::Acquisition(_) => 2002,
            CalibrationError::ScheduleInPast { .. } => 2003,
            CalibrationError::ConfigLoad { .. } => 2004,
        }
    }

    fn message(&self) -> String {
        match self {
            CalibrationError::InvalidParameter { name, reason } => {
                format!("Invalid parameter '{}': {}", name, reason)
            }
            CalibrationError::Acquisition(err) => {
                format!("Audio acquisition failed: {}", err.message())
            }
            CalibrationError::ScheduleInPast { output_time, now } => format!(
                "Output time {:.6}s is already in the past (now {:.6}s)",
                output_time, now
            ),
            CalibrationError::ConfigLoad { path, reason } => {
                format!("Failed to load config {}: {}", path, reason)
            }
        }
    }
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CalibrationError (code {}): {}", self.code(), self.message())
    }
}

impl std::error::Error for CalibrationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CalibrationError::Acquisition(err) => Some(err),
            _ => None,
        }
    }
}

impl From<AudioError> for CalibrationError {
    fn from(err: AudioError) -> Self {
        CalibrationError::Acquisition(err)
    }
}
