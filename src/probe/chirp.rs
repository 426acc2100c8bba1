//! Logarithmic swept-tone probe
//!
//! The instantaneous frequency rises exponentially from `start_hz` to
//! `end_hz` over the sweep. Phase is the closed-form integral of that
//! frequency, so there are no phase discontinuities between samples.

use std::f64::consts::PI;

use crate::config::ChirpConfig;
use crate::error::CalibrationError;

use super::{apply_fade, normalize_peak};

/// Generate a faded, peak-normalized logarithmic chirp
///
/// # Arguments
/// * `config` - Sweep bounds and duration
/// * `sample_rate` - Sample rate in Hz
/// * `fade_samples` - Length of the linear fade at each edge
/// * `amplitude` - Peak magnitude of the returned buffer
pub fn generate(
    config: &ChirpConfig,
    sample_rate: u32,
    fade_samples: usize,
    amplitude: f32,
) -> Result<Vec<f32>, CalibrationError> {
    let num_samples = (config.duration_ms * sample_rate as f64 / 1000.0).round() as usize;
    if num_samples < 2 {
        return Err(CalibrationError::invalid(
            "probe.chirp.duration_ms",
            format!(
                "{} ms is shorter than two samples at {} Hz",
                config.duration_ms, sample_rate
            ),
        ));
    }

    let sr = sample_rate as f64;
    let duration = num_samples as f64 / sr;
    let f0 = config.start_hz;
    let ratio_ln = (config.end_hz / f0).ln();

    let mut samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f64 / sr;
            cosine_sample(f0, ratio_ln, duration, t) as f32
        })
        .collect();

    apply_fade(&mut samples, fade_samples);
    normalize_peak(&mut samples, amplitude);
    Ok(samples)
}

/// Unit cosine of the exponential sweep at time `t`
#[inline]
fn cosine_sample(f0: f64, ratio_ln: f64, duration: f64, t: f64) -> f64 {
    // Degenerate sweep (start == end) collapses to a plain tone
    let phase = if ratio_ln.abs() < 1e-12 {
        2.0 * PI * f0 * t
    } else {
        let k = duration / ratio_ln;
        2.0 * PI * f0 * k * ((t / k).exp() - 1.0)
    };
    phase.cos()
}

/// Instantaneous frequency of the sweep at time `t`, in Hz
pub fn instantaneous_frequency(config: &ChirpConfig, t: f64) -> f64 {
    let duration = config.duration_ms / 1000.0;
    let ratio_ln = (config.end_hz / config.start_hz).ln();
    config.start_hz * (ratio_ln * t / duration).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chirp_length_matches_duration() {
        for &sr in &[44_100u32, 48_000, 96_000] {
            let config = ChirpConfig::default();
            let samples = generate(&config, sr, 10, 0.5).unwrap();
            let expected = (config.duration_ms * sr as f64 / 1000.0).round() as usize;
            assert_eq!(samples.len(), expected, "chirp length at {} Hz", sr);
        }
    }

    #[test]
    fn test_frequency_rises_monotonically() {
        let config = ChirpConfig::default();
        let mut previous = 0.0;
        for step in 0..=100 {
            let t = step as f64 / 100.0 * config.duration_ms / 1000.0;
            let f = instantaneous_frequency(&config, t);
            assert!(f > previous, "frequency must increase (t={}, f={})", t, f);
            previous = f;
        }
        let end = instantaneous_frequency(&config, config.duration_ms / 1000.0);
        assert!((end - config.end_hz).abs() < 1e-6);
    }

    #[test]
    fn test_no_phase_discontinuity() {
        // Consecutive samples of a band-limited sweep can differ by at most
        // 2·sin(π·f_max/sr) at unit amplitude
        let config = ChirpConfig::default();
        let sr = 48_000;
        let samples = generate(&config, sr, 1, 1.0).unwrap();
        let bound = 2.0 * (std::f64::consts::PI * config.end_hz / sr as f64).sin() as f32 + 0.05;
        for pair in samples.windows(2) {
            assert!((pair[1] - pair[0]).abs() <= bound);
        }
    }

    #[test]
    fn test_too_short_rejected() {
        let config = ChirpConfig {
            duration_ms: 0.01,
            ..ChirpConfig::default()
        };
        assert!(generate(&config, 48_000, 1, 0.5).is_err());
    }
}
