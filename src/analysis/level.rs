//! Capture level diagnostics: RMS, peak and clipping

use serde::{Deserialize, Serialize};

/// Root-mean-square level; 0 for an empty buffer
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_sq / samples.len() as f64).sqrt() as f32
}

/// Largest absolute sample value
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
}

/// True when the peak magnitude reaches or exceeds `threshold`
pub fn is_clipped(samples: &[f32], threshold: f32) -> bool {
    peak(samples) >= threshold
}

/// Level summary of one captured buffer
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SignalLevel {
    pub rms: f32,
    pub peak: f32,
    pub clipped: bool,
}

impl SignalLevel {
    pub fn measure(samples: &[f32], clip_threshold: f32) -> Self {
        let peak = peak(samples);
        Self {
            rms: rms(samples),
            peak,
            clipped: peak >= clip_threshold,
        }
    }
}
