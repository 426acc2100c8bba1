//! Probe signals - deterministic reference waveforms for latency measurement
//!
//! Two interchangeable generators produce the probe that is played and later
//! correlated against the capture:
//! - [`chirp`]: logarithmic swept cosine, sharp autocorrelation peak
//! - [`mls`]: maximal-length ±1 sequence from a linear-feedback shift register
//!
//! Both are pure functions of their parameters. The exact buffer that was
//! scheduled for playback is kept and reused as the correlation reference,
//! so generation must be bit-identical across calls.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::ProbeConfig;
use crate::error::CalibrationError;

pub mod chirp;
pub mod mls;

/// Generation method of a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    /// Logarithmic swept tone
    #[default]
    Chirp,
    /// Maximal-length binary sequence
    Mls,
}

/// Immutable probe buffer with its generation tag
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeSignal {
    samples: Arc<[f32]>,
    sample_rate: u32,
    kind: ProbeKind,
    peak: f32,
}

impl ProbeSignal {
    /// Generate the probe described by `config` at `amplitude` peak
    ///
    /// `amplitude` overrides `config.amplitude` so the robust aggregator can
    /// adapt the level between trials without cloning the configuration.
    pub fn generate(
        config: &ProbeConfig,
        sample_rate: u32,
        amplitude: f32,
    ) -> Result<Self, CalibrationError> {
        let mut adjusted = config.clone();
        adjusted.amplitude = amplitude;
        adjusted.validate(sample_rate)?;

        let fade_samples = fade_length(adjusted.fade_ms, sample_rate);
        let samples = match adjusted.kind {
            ProbeKind::Chirp => chirp::generate(&adjusted.chirp, sample_rate, fade_samples, amplitude)?,
            ProbeKind::Mls => mls::generate(&adjusted.mls, fade_samples, amplitude)?,
        };

        Ok(Self {
            samples: samples.into(),
            sample_rate,
            kind: adjusted.kind,
            peak: amplitude,
        })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Shared handle to the sample buffer, for scheduling playback without a copy
    pub fn shared_samples(&self) -> Arc<[f32]> {
        Arc::clone(&self.samples)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn kind(&self) -> ProbeKind {
        self.kind
    }

    /// Configured peak amplitude
    pub fn peak(&self) -> f32 {
        self.peak
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Number of fade samples for a fade duration, never less than one
pub fn fade_length(fade_ms: f64, sample_rate: u32) -> usize {
    ((fade_ms * sample_rate as f64 / 1000.0).round() as usize).max(1)
}

/// Linear edge gain for sample `index` of a `len`-sample buffer
///
/// Rises from 0 over the first `fade` samples and falls to 0 over the last
/// `fade` samples; 1 in between. The fade is clamped to half the buffer.
#[inline]
pub fn fade_gain(index: usize, len: usize, fade: usize) -> f32 {
    let fade = fade.min(len / 2).max(1);
    let from_edge = index.min(len.saturating_sub(1).saturating_sub(index));
    if from_edge >= fade {
        1.0
    } else {
        from_edge as f32 / fade as f32
    }
}

/// Apply the symmetric linear fade in place
pub(crate) fn apply_fade(samples: &mut [f32], fade: usize) {
    let len = samples.len();
    for (i, sample) in samples.iter_mut().enumerate() {
        *sample *= fade_gain(i, len, fade);
    }
}

/// Scale so the largest magnitude equals `amplitude`; silent buffers stay silent
pub(crate) fn normalize_peak(samples: &mut [f32], amplitude: f32) {
    let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    if peak <= f32::EPSILON {
        return;
    }
    let scale = amplitude / peak;
    for sample in samples.iter_mut() {
        // clamp guards against the product rounding a hair above the target
        *sample = (*sample * scale).clamp(-amplitude, amplitude);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProbeConfig;

    fn peak(samples: &[f32]) -> f32 {
        samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
    }

    #[test]
    fn test_fade_gain_edges() {
        assert_eq!(fade_gain(0, 100, 10), 0.0);
        assert_eq!(fade_gain(99, 100, 10), 0.0);
        assert_eq!(fade_gain(5, 100, 10), 0.5);
        assert_eq!(fade_gain(94, 100, 10), 0.5);
        assert_eq!(fade_gain(50, 100, 10), 1.0);
    }

    #[test]
    fn test_fade_length_minimum_one_sample() {
        assert_eq!(fade_length(0.0, 48_000), 1);
        assert_eq!(fade_length(5.0, 48_000), 240);
    }

    #[test]
    fn test_peak_never_exceeds_amplitude() {
        for kind in [ProbeKind::Chirp, ProbeKind::Mls] {
            let mut config = ProbeConfig::default();
            config.kind = kind;
            config.mls.order = 10;
            for amplitude in [0.05f32, 0.3, 0.77, 1.0] {
                let probe = ProbeSignal::generate(&config, 48_000, amplitude).unwrap();
                let p = peak(probe.samples());
                assert!(
                    p <= amplitude,
                    "{:?} peak {} exceeds amplitude {}",
                    kind,
                    p,
                    amplitude
                );
                assert!(p > amplitude * 0.99, "{:?} peak {} not normalized", kind, p);
            }
        }
    }

    #[test]
    fn test_generation_is_deterministic() {
        for kind in [ProbeKind::Chirp, ProbeKind::Mls] {
            let mut config = ProbeConfig::default();
            config.kind = kind;
            let a = ProbeSignal::generate(&config, 44_100, 0.5).unwrap();
            let b = ProbeSignal::generate(&config, 44_100, 0.5).unwrap();
            assert_eq!(a.samples(), b.samples(), "{:?} generation must be bit-identical", kind);
        }
    }

    #[test]
    fn test_fade_edges_rise_from_zero() {
        for kind in [ProbeKind::Chirp, ProbeKind::Mls] {
            let mut config = ProbeConfig::default();
            config.kind = kind;
            config.fade_ms = 2.0;
            let probe = ProbeSignal::generate(&config, 48_000, 0.8).unwrap();
            let s = probe.samples();
            let fade = fade_length(config.fade_ms, 48_000);
            let len = s.len();

            assert_eq!(s[0], 0.0);
            assert_eq!(s[len - 1], 0.0);
            for i in 0..fade {
                let envelope = 0.8 * fade_gain(i, len, fade) * 1.001 + 1e-6;
                assert!(s[i].abs() <= envelope, "fade-in sample {} above envelope", i);
                assert!(s[len - 1 - i].abs() <= envelope, "fade-out sample {} above envelope", i);
            }
        }
    }

    #[test]
    fn test_mls_fade_magnitudes_monotonic() {
        let mut config = ProbeConfig::default();
        config.kind = ProbeKind::Mls;
        config.mls.order = 9;
        config.fade_ms = 1.0;
        let probe = ProbeSignal::generate(&config, 48_000, 0.6).unwrap();
        let s = probe.samples();
        let fade = fade_length(config.fade_ms, 48_000);
        let len = s.len();

        for i in 1..fade {
            assert!(
                s[i].abs() > s[i - 1].abs(),
                "fade-in magnitude must rise away from the edge at {}",
                i
            );
            assert!(
                s[len - 1 - i].abs() > s[len - i].abs(),
                "fade-out magnitude must rise away from the edge at {}",
                i
            );
        }
    }

    #[test]
    fn test_invalid_amplitude_rejected() {
        let config = ProbeConfig::default();
        assert!(ProbeSignal::generate(&config, 48_000, 0.0).is_err());
        assert!(ProbeSignal::generate(&config, 48_000, 1.5).is_err());
    }

    #[test]
    fn test_probe_metadata() {
        let config = ProbeConfig::default();
        let probe = ProbeSignal::generate(&config, 48_000, 0.5).unwrap();
        assert_eq!(probe.kind(), ProbeKind::Chirp);
        assert_eq!(probe.sample_rate(), 48_000);
        assert_eq!(probe.len(), 9_600);
        assert!((probe.duration_secs() - 0.2).abs() < 1e-9);
        assert_eq!(probe.peak(), 0.5);
    }
}
