// Trial results and the calibration outcome returned to callers

use serde::{Deserialize, Serialize};

use crate::analysis::{LagEstimate, SignalLevel};
use crate::audio::GateSummary;

/// Advisory quality flags; none of them fail a calibration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityWarning {
    /// Correlation score below the warning threshold
    LowConfidence,
    /// Lag larger than any plausible round trip
    ImplausibleLag,
    /// Capture peak reached the clipping threshold
    Clipped,
    /// Capture RMS below the quiet threshold
    TooQuiet,
    /// The capture never completed (timeout or nothing received)
    NoData,
    /// The gate lost samples because its pool or queue was exhausted
    SamplesDropped,
}

/// Estimate plus diagnostics for one trial
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub estimate: LagEstimate,
    /// Levels of the unfiltered capture
    pub level: SignalLevel,
    /// Probe peak amplitude used for this trial
    pub amplitude: f32,
    pub warnings: Vec<QualityWarning>,
    pub captured_samples: usize,
    pub gate: Option<GateSummary>,
}

impl TrialResult {
    pub fn score(&self) -> f64 {
        self.estimate.score
    }

    pub fn lag_samples(&self) -> i64 {
        self.estimate.lag_samples
    }

    pub fn has_warning(&self, warning: QualityWarning) -> bool {
        self.warnings.contains(&warning)
    }

    pub fn is_no_data(&self) -> bool {
        self.has_warning(QualityWarning::NoData)
    }

    /// Captured data whose correlation reaches `min_score`
    pub fn is_trusted(&self, min_score: f64) -> bool {
        !self.is_no_data() && self.score() >= min_score
    }
}

/// How the outcome's representative trial was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    /// Single-trial calibration
    Single,
    /// Median-by-lag of the trials meeting the minimum score
    Median,
    /// No trial met the minimum score; best-scoring trial overall
    BestEffort,
    /// No trial ran; zero-confidence default
    #[default]
    NoTrials,
}

/// Value returned by a calibration call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationOutcome {
    pub result: TrialResult,
    pub selection: Selection,
    pub valid_trials: usize,
    pub total_trials: usize,
}

impl CalibrationOutcome {
    pub fn estimate(&self) -> &LagEstimate {
        &self.result.estimate
    }

    /// Measured round trip in milliseconds
    pub fn latency_ms(&self) -> f64 {
        self.result.estimate.lag_ms
    }

    pub fn score(&self) -> f64 {
        self.result.estimate.score
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_outcome_is_zero_confidence() {
        let outcome = CalibrationOutcome::default();
        assert_eq!(outcome.selection, Selection::NoTrials);
        assert_eq!(outcome.latency_ms(), 0.0);
        assert_eq!(outcome.score(), 0.0);
        assert_eq!(outcome.total_trials, 0);
    }

    #[test]
    fn test_outcome_json_round_trip() {
        let outcome = CalibrationOutcome {
            result: TrialResult {
                estimate: LagEstimate {
                    lag_samples: 960,
                    lag_ms: 20.0,
                    score: 0.93,
                },
                amplitude: 0.5,
                warnings: vec![QualityWarning::Clipped],
                captured_samples: 33_600,
                ..TrialResult::default()
            },
            selection: Selection::Median,
            valid_trials: 4,
            total_trials: 6,
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"median\""));
        assert!(json.contains("\"clipped\""));
        let parsed: CalibrationOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, outcome);
        assert_eq!(parsed.latency_ms(), 20.0);
    }

    #[test]
    fn test_warning_helpers() {
        let result = TrialResult {
            warnings: vec![QualityWarning::NoData, QualityWarning::TooQuiet],
            ..TrialResult::default()
        };
        assert!(result.is_no_data());
        assert!(result.has_warning(QualityWarning::TooQuiet));
        assert!(!result.has_warning(QualityWarning::Clipped));
    }
}
