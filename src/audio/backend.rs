//! Backend abstraction for the calibrator
//!
//! A backend owns the real-time streams and exposes the three capabilities
//! a calibration trial needs: a shared audio clock, sample-accurate
//! scheduled playback and the recording gate handle.

use std::sync::Arc;

use super::clock::AudioClock;
use super::gate::GateHandle;
use crate::error::AudioError;

/// Trait implemented by audio I/O backends.
///
/// Not `Send`: desktop streams are bound to the thread that opened them.
pub trait AudioBackend {
    /// Clock shared with the audio callbacks
    fn clock(&self) -> Arc<dyn AudioClock>;

    fn sample_rate(&self) -> u32 {
        self.clock().sample_rate()
    }

    /// Queue `samples` so the first one leaves the output at `start_time`
    fn play_at(&mut self, samples: Arc<[f32]>, start_time: f64) -> Result<(), AudioError>;

    /// Coordinator side of the recording gate
    fn gate(&mut self) -> &mut GateHandle;

    /// Whether captured chunks carry a copy of the emitted signal
    fn has_reference_tap(&self) -> bool {
        false
    }
}
