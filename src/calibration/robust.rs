// Robust multi-trial calibration
//
// Runs several sequential trials, adapting the probe amplitude between them
// (down after clipping, up after a too-quiet capture), then reduces the
// trials to one representative result:
// - trials with data scoring at least `min_score` are valid
// - with valid trials, the one with the median lag wins (lower-middle for
//   even counts, no interpolation)
// - otherwise the best-scoring trial overall
// - with no trials at all, a zero-confidence default

use std::time::Duration;

use tokio::sync::broadcast;

use crate::audio::AudioBackend;
use crate::config::{CalibrationConfig, RobustConfig};
use crate::error::{log_calibration_error, CalibrationError};

use super::progress::TrialProgress;
use super::result::{CalibrationOutcome, QualityWarning, Selection, TrialResult};
use super::trial::LatencyCalibrator;

/// Multiplicative probe amplitude adaptation between trials
#[derive(Debug, Clone)]
pub struct AmplitudeController {
    amplitude: f32,
    enabled: bool,
    down: f32,
    up: f32,
    min: f32,
    max: f32,
}

impl AmplitudeController {
    pub fn new(initial: f32, config: &RobustConfig) -> Self {
        Self {
            amplitude: initial.clamp(config.min_amplitude, config.max_amplitude),
            enabled: config.adapt_amplitude,
            down: config.amplitude_down,
            up: config.amplitude_up,
            min: config.min_amplitude,
            max: config.max_amplitude,
        }
    }

    pub fn amplitude(&self) -> f32 {
        self.amplitude
    }

    /// Adjust after a trial and return the amplitude for the next one
    pub fn update(&mut self, result: &TrialResult) -> f32 {
        if !self.enabled || result.is_no_data() {
            return self.amplitude;
        }
        if result.has_warning(QualityWarning::Clipped) {
            self.amplitude = (self.amplitude * self.down).max(self.min);
            log::debug!("[Calibrator] Capture clipped, amplitude down to {:.3}", self.amplitude);
        } else if result.has_warning(QualityWarning::TooQuiet) {
            self.amplitude = (self.amplitude * self.up).min(self.max);
            log::debug!("[Calibrator] Capture too quiet, amplitude up to {:.3}", self.amplitude);
        }
        self.amplitude
    }
}

/// Reduce finished trials to one outcome
pub fn aggregate_trials(trials: &[TrialResult], min_score: f64) -> CalibrationOutcome {
    let total_trials = trials.len();
    let mut valid: Vec<&TrialResult> = trials.iter().filter(|t| t.is_trusted(min_score)).collect();

    if !valid.is_empty() {
        valid.sort_by_key(|t| t.lag_samples());
        let median = valid[(valid.len() - 1) / 2];
        return CalibrationOutcome {
            result: median.clone(),
            selection: Selection::Median,
            valid_trials: valid.len(),
            total_trials,
        };
    }

    let best = trials.iter().fold(None::<&TrialResult>, |best, trial| match best {
        Some(current) if trial.score() <= current.score() => Some(current),
        _ => Some(trial),
    });

    match best {
        Some(best) => CalibrationOutcome {
            result: best.clone(),
            selection: Selection::BestEffort,
            valid_trials: 0,
            total_trials,
        },
        None => CalibrationOutcome::default(),
    }
}

impl<B: AudioBackend> LatencyCalibrator<B> {
    /// Run `robust.trials` trials and return the aggregated outcome
    pub async fn calibrate_robust(
        &mut self,
        config: &CalibrationConfig,
        robust: &RobustConfig,
    ) -> Result<CalibrationOutcome, CalibrationError> {
        self.calibrate_robust_with_progress(config, robust, None).await
    }

    /// Like [`Self::calibrate_robust`], publishing a [`TrialProgress`] after every trial
    pub async fn calibrate_robust_with_progress(
        &mut self,
        config: &CalibrationConfig,
        robust: &RobustConfig,
        progress: Option<&broadcast::Sender<TrialProgress>>,
    ) -> Result<CalibrationOutcome, CalibrationError> {
        robust.validate()?;
        config.validate(self.backend().sample_rate())?;

        let mut controller = AmplitudeController::new(config.probe.amplitude, robust);
        let mut trials = Vec::with_capacity(robust.trials);
        let gap = Duration::from_millis(robust.inter_trial_gap_ms);

        log::info!(
            "[Calibrator] Starting robust calibration: {} trials, min score {:.2}",
            robust.trials,
            robust.min_score
        );

        for trial_index in 0..robust.trials {
            if trial_index > 0 && !gap.is_zero() {
                tokio::time::sleep(gap).await;
            }

            let record = self
                .run_trial(config, controller.amplitude())
                .await
                .inspect_err(|e| log_calibration_error(e, "robust calibration"))?;
            let next_amplitude = controller.update(&record.result);
            trials.push(record.result);

            if let Some(tx) = progress {
                let valid_so_far = trials.iter().filter(|t| t.is_trusted(robust.min_score)).count();
                // No subscribers is not an error
                let _ = tx.send(TrialProgress {
                    trial_index,
                    total_trials: robust.trials,
                    next_amplitude,
                    valid_so_far,
                    result: trials[trial_index].clone(),
                });
            }
        }

        let outcome = aggregate_trials(&trials, robust.min_score);
        match outcome.selection {
            Selection::BestEffort => log::warn!(
                "[Calibrator] No trial reached score {:.2}; best effort {:.2} ms (score {:.3})",
                robust.min_score,
                outcome.latency_ms(),
                outcome.score()
            ),
            _ => log::info!(
                "[Calibrator] Robust result: {:.2} ms (score {:.3}, {} of {} trials valid)",
                outcome.latency_ms(),
                outcome.score(),
                outcome.valid_trials,
                outcome.total_trials
            ),
        }
        Ok(outcome)
    }
}
