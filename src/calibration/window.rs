// Capture window and buffer assembly for one trial
//
// A window is anchored at an absolute frame on the audio clock and split in
// three phases: pre-roll, the probe itself, post-roll. Its total sample
// count is fixed when it is opened. The assembler rebuilds the captured
// buffer from gate chunks on the coordination side.

use serde::{Deserialize, Serialize};

use crate::audio::{CaptureChunk, GateSummary};

/// Convert a duration in milliseconds to a whole number of samples
pub fn ms_to_samples(ms: f64, sample_rate: u32) -> usize {
    (ms.max(0.0) * sample_rate as f64 / 1000.0).round() as usize
}

/// Time span recorded for one trial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureWindow {
    /// Absolute frame of the first recorded sample
    pub start_frame: u64,
    pub pre_roll_samples: usize,
    pub probe_samples: usize,
    pub post_roll_samples: usize,
    pub sample_rate: u32,
}

impl CaptureWindow {
    pub fn new(
        start_frame: u64,
        sample_rate: u32,
        pre_roll_ms: f64,
        probe_samples: usize,
        post_roll_ms: f64,
    ) -> Self {
        Self {
            start_frame,
            pre_roll_samples: ms_to_samples(pre_roll_ms, sample_rate),
            probe_samples,
            post_roll_samples: ms_to_samples(post_roll_ms, sample_rate),
            sample_rate,
        }
    }

    pub fn total_samples(&self) -> usize {
        self.pre_roll_samples + self.probe_samples + self.post_roll_samples
    }

    fn frame_time(&self, frame: u64) -> f64 {
        frame as f64 / self.sample_rate as f64
    }

    pub fn start_time(&self) -> f64 {
        self.frame_time(self.start_frame)
    }

    /// Time at which the first probe sample must leave the output
    pub fn probe_start_time(&self) -> f64 {
        self.frame_time(self.start_frame + self.pre_roll_samples as u64)
    }

    pub fn end_time(&self) -> f64 {
        self.frame_time(self.start_frame + self.total_samples() as u64)
    }

    /// The probe as it sits on the window timeline: zeros, probe, zeros
    ///
    /// Correlating a capture against this buffer yields the round-trip lag
    /// directly, with no pre-roll offset to subtract.
    pub fn reference_on_timeline(&self, probe: &[f32]) -> Vec<f32> {
        let mut reference = vec![0.0f32; self.total_samples()];
        let start = self.pre_roll_samples;
        let len = probe.len().min(self.total_samples() - start);
        reference[start..start + len].copy_from_slice(&probe[..len]);
        reference
    }
}

/// Samples recorded for one trial
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapturedBuffer {
    /// Exactly `CaptureWindow::total_samples()` long; unreceived spans are zero
    pub samples: Vec<f32>,
    /// Parallel copy of the emitted signal, when the backend taps it
    pub reference_tap: Option<Vec<f32>>,
    /// Samples actually received from the gate
    pub received_samples: usize,
    /// Gate completion report; `None` if the wait timed out
    pub summary: Option<GateSummary>,
}

impl CapturedBuffer {
    pub fn is_complete(&self) -> bool {
        self.summary.is_some() && self.received_samples == self.samples.len()
    }
}

/// Rebuilds a window's buffer from gate chunks
pub struct CaptureAssembler {
    samples: Vec<f32>,
    reference: Option<Vec<f32>>,
    received: usize,
}

impl CaptureAssembler {
    pub fn new(total_samples: usize) -> Self {
        Self {
            samples: vec![0.0; total_samples],
            reference: None,
            received: 0,
        }
    }

    /// Copy a chunk into place
    ///
    /// Chunks arrive in time order, so placing each at its window offset
    /// is the same as concatenating them; a chunk lost by the gate leaves
    /// a zero gap instead of shifting everything after it.
    pub fn accept(&mut self, chunk: &CaptureChunk) {
        let total = self.samples.len();
        let start = chunk.window_offset.min(total);
        let len = chunk.samples.len().min(total - start);
        self.samples[start..start + len].copy_from_slice(&chunk.samples[..len]);
        self.received += len;

        if let Some(tap) = &chunk.reference {
            let reference = self.reference.get_or_insert_with(|| vec![0.0; total]);
            let tap_len = tap.len().min(total - start);
            reference[start..start + tap_len].copy_from_slice(&tap[..tap_len]);
        }
    }

    pub fn received(&self) -> usize {
        self.received
    }

    pub fn finish(self, summary: Option<GateSummary>) -> CapturedBuffer {
        CapturedBuffer {
            samples: self.samples,
            reference_tap: self.reference,
            received_samples: self.received,
            summary,
        }
    }
}
