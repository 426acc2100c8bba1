//! Normalized lag estimation
//!
//! Finds the offset at which the captured signal best matches the reference
//! by scanning a bounded lag range and scoring each candidate with the
//! normalized cross-correlation over the overlapping samples:
//!
//! ```text
//! score(τ) = Σ ref[i]·cap[i+τ] / sqrt(Σ cap[i+τ]² · Σ ref[i]²)
//! ```
//!
//! Both inputs are DC-centered first. Candidates with too little overlap or
//! no energy are skipped, and degenerate inputs yield a zero-confidence
//! estimate instead of an error.

use serde::{Deserialize, Serialize};

/// Inputs shorter than this produce a zero-confidence estimate
pub const MIN_VIABLE_LEN: usize = 8;
/// Candidate lags with less overlap than this are excluded
pub const MIN_OVERLAP: usize = 16;
/// Local energies at or below this are treated as silence
pub const ENERGY_EPSILON: f64 = 1e-12;

/// Best-matching offset between a capture and its reference
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LagEstimate {
    /// Offset of the reference inside the capture, in samples
    pub lag_samples: i64,
    /// Same offset in milliseconds
    pub lag_ms: f64,
    /// Normalized correlation at the chosen lag, in [-1, 1]
    pub score: f64,
}

impl LagEstimate {
    /// Zero-confidence result for inputs that cannot be correlated
    pub const fn zero() -> Self {
        Self {
            lag_samples: 0,
            lag_ms: 0.0,
            score: 0.0,
        }
    }

    fn from_lag(lag_samples: i64, score: f64, sample_rate: u32) -> Self {
        Self {
            lag_samples,
            lag_ms: lag_samples as f64 * 1000.0 / sample_rate as f64,
            score,
        }
    }

    pub fn lag_secs(&self) -> f64 {
        self.lag_ms / 1000.0
    }
}

/// Lag search range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LagSearch {
    /// Largest plausible round trip, in milliseconds
    pub max_lag_ms: f64,
    /// Search `[-max, max]` instead of `[0, max]`
    pub allow_negative: bool,
}

impl LagSearch {
    pub fn non_negative(max_lag_ms: f64) -> Self {
        Self {
            max_lag_ms,
            allow_negative: false,
        }
    }

    /// Maximum lag in samples, capped to half the shorter input
    pub fn max_lag_samples(&self, sample_rate: u32, captured_len: usize, reference_len: usize) -> i64 {
        let configured = (self.max_lag_ms.max(0.0) * sample_rate as f64 / 1000.0).round() as i64;
        let cap = (captured_len.min(reference_len) / 2) as i64;
        configured.min(cap)
    }
}

/// Estimate the lag of `reference` inside `captured`
///
/// Ties keep the candidate with the smallest |τ|; candidates are visited in
/// order 0, 1, -1, 2, -2, ... and only a strictly better score replaces the
/// current best.
///
/// # Complexity
/// O(max_lag × overlap), bounded by the configured maximum round trip.
pub fn estimate_lag(
    captured: &[f32],
    reference: &[f32],
    sample_rate: u32,
    search: &LagSearch,
) -> LagEstimate {
    if captured.len() < MIN_VIABLE_LEN || reference.len() < MIN_VIABLE_LEN || sample_rate == 0 {
        return LagEstimate::zero();
    }

    let cap = dc_centered(captured);
    let reference = dc_centered(reference);
    let max_lag = search.max_lag_samples(sample_rate, cap.len(), reference.len());

    let mut best: Option<(i64, f64)> = None;
    for magnitude in 0..=max_lag {
        let mirrored = (search.allow_negative && magnitude > 0).then_some(-magnitude);
        for lag in std::iter::once(magnitude).chain(mirrored) {
            if let Some(score) = score_at(&cap, &reference, lag) {
                if best.map_or(true, |(_, current)| score > current) {
                    best = Some((lag, score));
                }
            }
        }
    }

    match best {
        Some((lag, score)) => LagEstimate::from_lag(lag, score.clamp(-1.0, 1.0), sample_rate),
        None => LagEstimate::zero(),
    }
}

/// Normalized correlation at one lag, `None` if the lag is excluded
fn score_at(cap: &[f64], reference: &[f64], lag: i64) -> Option<f64> {
    let start = (-lag).max(0);
    let end = (reference.len() as i64).min(cap.len() as i64 - lag);
    if end - start < MIN_OVERLAP as i64 {
        return None;
    }

    let mut dot = 0.0;
    let mut cap_energy = 0.0;
    let mut ref_energy = 0.0;
    for i in start as usize..end as usize {
        let r = reference[i];
        let c = cap[(i as i64 + lag) as usize];
        dot += r * c;
        cap_energy += c * c;
        ref_energy += r * r;
    }

    if cap_energy <= ENERGY_EPSILON || ref_energy <= ENERGY_EPSILON {
        return None;
    }
    Some(dot / (cap_energy * ref_energy).sqrt())
}

fn dc_centered(samples: &[f32]) -> Vec<f64> {
    let mean = samples.iter().map(|&s| s as f64).sum::<f64>() / samples.len() as f64;
    samples.iter().map(|&s| s as f64 - mean).collect()
}
