// Aligned scheduling from a measured latency
//
// Given the time at which an event should be observed on the input side,
// the output must be issued one round trip earlier, plus a small margin to
// absorb scheduling jitter.

use crate::analysis::LagEstimate;
use crate::audio::AudioClock;
use crate::error::CalibrationError;

/// Safety margin subtracted from every aligned output time (5 ms)
pub const SCHEDULING_MARGIN_SECS: f64 = 0.005;

/// Absolute output start time for an event that must land on the input
/// path at `target_capture_time`
pub fn schedule_aligned_event(target_capture_time: f64, latency: &LagEstimate) -> f64 {
    target_capture_time - latency.lag_secs() - SCHEDULING_MARGIN_SECS
}

/// Like [`schedule_aligned_event`], rejecting output times already behind `clock`
pub fn schedule_aligned_event_checked(
    clock: &dyn AudioClock,
    target_capture_time: f64,
    latency: &LagEstimate,
) -> Result<f64, CalibrationError> {
    let output_time = schedule_aligned_event(target_capture_time, latency);
    let now = clock.now();
    if output_time < now {
        return Err(CalibrationError::ScheduleInPast { output_time, now });
    }
    Ok(output_time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::FrameClock;

    fn latency(ms: f64) -> LagEstimate {
        LagEstimate {
            lag_samples: (ms * 48.0) as i64,
            lag_ms: ms,
            score: 0.9,
        }
    }

    #[test]
    fn test_output_precedes_target_by_latency_and_margin() {
        let output = schedule_aligned_event(10.0, &latency(25.0));
        assert!((output - (10.0 - 0.025 - SCHEDULING_MARGIN_SECS)).abs() < 1e-12);
    }

    #[test]
    fn test_zero_latency_still_applies_margin() {
        let output = schedule_aligned_event(1.0, &LagEstimate::zero());
        assert!((output - 0.995).abs() < 1e-12);
    }

    #[test]
    fn test_checked_rejects_past_output_time() {
        let clock = FrameClock::new(48_000);
        clock.advance(48_000);

        let err = schedule_aligned_event_checked(&clock, 1.01, &latency(20.0)).unwrap_err();
        assert!(matches!(err, CalibrationError::ScheduleInPast { .. }));

        let ok = schedule_aligned_event_checked(&clock, 1.5, &latency(20.0)).unwrap();
        assert!(ok > clock.now());
    }
}
