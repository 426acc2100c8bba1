//! Audio clock - monotonic time derived from a frame counter
//!
//! Every time value in the calibrator (gate windows, playback starts,
//! scheduled events) is expressed in seconds on one audio clock. Backends
//! derive that clock from the number of frames their output callback has
//! rendered, so time advances in exact sample steps with zero jitter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic audio-clock source
pub trait AudioClock: Send + Sync {
    /// Current time in seconds
    fn now(&self) -> f64;

    fn sample_rate(&self) -> u32;
}

/// Clock backed by a shared atomic frame counter
///
/// The audio thread advances the counter once per rendered block; any
/// number of readers can clone the clock and observe it.
#[derive(Debug, Clone)]
pub struct FrameClock {
    frames: Arc<AtomicU64>,
    sample_rate: u32,
}

impl FrameClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            frames: Arc::new(AtomicU64::new(0)),
            sample_rate,
        }
    }

    /// Advance by `frames` rendered frames
    #[inline]
    pub fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::Release);
    }

    #[inline]
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    #[inline]
    pub fn frame_to_time(&self, frame: u64) -> f64 {
        frame as f64 / self.sample_rate as f64
    }

    /// Nearest frame index for an absolute time (negative times map to 0)
    #[inline]
    pub fn time_to_frame(&self, time: f64) -> u64 {
        (time * self.sample_rate as f64).round().max(0.0) as u64
    }
}

impl AudioClock for FrameClock {
    fn now(&self) -> f64 {
        self.frame_to_time(self.frames())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_starts_at_zero() {
        let clock = FrameClock::new(48_000);
        assert_eq!(clock.frames(), 0);
        assert_eq!(clock.now(), 0.0);
    }

    #[test]
    fn test_clock_advances_in_frames() {
        let clock = FrameClock::new(48_000);
        let reader = clock.clone();
        clock.advance(24_000);
        assert_eq!(reader.frames(), 24_000);
        assert!((reader.now() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_time_frame_conversion() {
        let clock = FrameClock::new(44_100);
        assert_eq!(clock.time_to_frame(1.0), 44_100);
        assert_eq!(clock.time_to_frame(clock.frame_to_time(12_345)), 12_345);
        assert_eq!(clock.time_to_frame(-0.5), 0);
    }
}
