// Audio acquisition error types

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Log an audio error with structured context
///
/// The logging is non-blocking and will not panic on failure.
pub fn log_audio_error(err: &AudioError, context: &str) {
    error!(
        "Audio error in {}: code={}, component=AudioBackend, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Audio acquisition failures
///
/// Any of these aborts a calibration: the core never retries device access,
/// retry policy belongs to the caller.
///
/// Error code range: 1001-1008
#[derive(Debug, Clone, PartialEq)]
pub enum AudioError {
    /// No input or output device available
    NoDevice { direction: String },

    /// Microphone permission denied
    PermissionDenied,

    /// Failed to open audio stream
    StreamOpenFailed { reason: String },

    /// Audio stream failed or disconnected after opening
    StreamFailure { reason: String },

    /// Hardware error occurred
    HardwareError { details: String },

    /// Device offers no usable sample format
    UnsupportedFormat { format: String },

    /// A lock-free queue towards the audio thread is full
    QueueFull { queue: String },

    /// The audio thread has shut down
    BackendClosed,
}

impl ErrorCode for AudioError {
    fn code(&self) -> i32 {
        match self {
            AudioError::NoDevice { .. } => 1001,
            AudioError::PermissionDenied => 1002,
            AudioError::StreamOpenFailed { .. } => 1003,
            AudioError::StreamFailure { .. } => 1004,
            AudioError::HardwareError { .. } => 1005,
            AudioError::UnsupportedFormat { .. } => 1006,
            AudioError::QueueFull { .. } => 1007,
            AudioError::BackendClosed => 1008,
        }
    }

    fn message(&self) -> String {
        match self {
            AudioError::NoDevice { direction } => {
                format!("No default {} device found", direction)
            }
            AudioError::PermissionDenied => "Microphone permission denied".to_string(),
            AudioError::StreamOpenFailed { reason } => {
                format!("Failed to open audio stream: {}", reason)
            }
            AudioError::StreamFailure { reason } => {
                format!("Audio stream failure: {}", reason)
            }
            AudioError::HardwareError { details } => {
                format!("Hardware error: {}", details)
            }
            AudioError::UnsupportedFormat { format } => {
                format!("Unsupported sample format: {}", format)
            }
            AudioError::QueueFull { queue } => {
                format!("Queue to audio thread is full: {}", queue)
            }
            AudioError::BackendClosed => "Audio backend has shut down".to_string(),
        }
    }
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AudioError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for AudioError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_error_codes() {
        assert_eq!(
            AudioError::NoDevice {
                direction: "input".to_string()
            }
            .code(),
            1001
        );
        assert_eq!(AudioError::PermissionDenied.code(), 1002);
        assert_eq!(
            AudioError::StreamOpenFailed {
                reason: "test".to_string()
            }
            .code(),
            1003
        );
        assert_eq!(
            AudioError::QueueFull {
                queue: "playback".to_string()
            }
            .code(),
            1007
        );
        assert_eq!(AudioError::BackendClosed.code(), 1008);
    }

    #[test]
    fn test_audio_error_display() {
        let err = AudioError::NoDevice {
            direction: "output".to_string(),
        };
        assert!(err.message().contains("output"));
        assert!(err.to_string().contains("code 1001"));
    }
}
