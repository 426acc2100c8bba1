//! First-order high-pass filter
//!
//! Single-pole IIR (`y[n] = a·(y[n-1] + x[n] - x[n-1])`) used after capture to
//! strip low-frequency room and electrical noise from both the capture and
//! the reference before correlation.

use std::f64::consts::PI;

/// Single-pole high-pass filter state
#[derive(Debug, Clone)]
pub struct HighPassFilter {
    alpha: f64,
    prev_input: f64,
    prev_output: f64,
}

impl HighPassFilter {
    /// Create a filter with the given -3 dB cutoff
    pub fn new(cutoff_hz: f64, sample_rate: u32) -> Self {
        let rc = 1.0 / (2.0 * PI * cutoff_hz);
        let dt = 1.0 / sample_rate as f64;
        Self {
            alpha: rc / (rc + dt),
            prev_input: 0.0,
            prev_output: 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.prev_input = 0.0;
        self.prev_output = 0.0;
    }

    #[inline]
    pub fn process_sample(&mut self, input: f32) -> f32 {
        let x = input as f64;
        let y = self.alpha * (self.prev_output + x - self.prev_input);
        self.prev_input = x;
        self.prev_output = y;
        y as f32
    }

    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        samples.iter().map(|&s| self.process_sample(s)).collect()
    }
}

/// Filter a whole buffer from rest; a cutoff of 0 returns an unchanged copy
pub fn high_pass(samples: &[f32], cutoff_hz: f64, sample_rate: u32) -> Vec<f32> {
    if cutoff_hz <= 0.0 || sample_rate == 0 {
        return samples.to_vec();
    }
    HighPassFilter::new(cutoff_hz, sample_rate).process(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::level::rms;

    fn sine(freq: f64, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f64 / sample_rate as f64).sin() as f32)
            .collect()
    }

    #[test]
    fn test_disabled_filter_is_identity() {
        let input = sine(440.0, 48_000, 512);
        assert_eq!(high_pass(&input, 0.0, 48_000), input);
    }

    #[test]
    fn test_dc_is_removed() {
        let input = vec![0.5f32; 48_000];
        let output = high_pass(&input, 150.0, 48_000);
        let tail = &output[output.len() - 1_000..];
        assert!(tail.iter().all(|s| s.abs() < 1e-4), "DC should decay away");
    }

    #[test]
    fn test_high_frequencies_pass() {
        let input = sine(4_000.0, 48_000, 4_800);
        let output = high_pass(&input, 150.0, 48_000);
        let ratio = rms(&output[480..]) / rms(&input[480..]);
        assert!(ratio > 0.95, "4 kHz should pass nearly unchanged (ratio {})", ratio);
    }

    #[test]
    fn test_low_frequencies_attenuated() {
        let input = sine(20.0, 48_000, 48_000);
        let output = high_pass(&input, 150.0, 48_000);
        let ratio = rms(&output[24_000..]) / rms(&input[24_000..]);
        assert!(ratio < 0.2, "20 Hz should be attenuated (ratio {})", ratio);
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let mut filter = HighPassFilter::new(150.0, 48_000);
        let input = sine(1_000.0, 48_000, 256);
        let first = filter.process(&input);
        filter.reset();
        let second = filter.process(&input);
        assert_eq!(first, second);
    }
}
