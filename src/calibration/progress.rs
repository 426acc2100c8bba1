// Progress reporting for multi-trial calibration
//
// One update is published per finished trial on a tokio broadcast channel,
// so any number of observers (CLI progress line, UI stream) can follow a
// robust calibration without touching the coordinator.

use serde::{Deserialize, Serialize};

use super::result::TrialResult;

/// Snapshot published after each trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialProgress {
    /// Zero-based index of the finished trial
    pub trial_index: usize,
    pub total_trials: usize,
    /// Amplitude the next trial will use
    pub next_amplitude: f32,
    /// Trials so far meeting the minimum score
    pub valid_so_far: usize,
    pub result: TrialResult,
}

impl TrialProgress {
    pub fn is_last(&self) -> bool {
        self.trial_index + 1 >= self.total_trials
    }

    pub fn percent(&self) -> u8 {
        if self.total_trials == 0 {
            return 100;
        }
        (((self.trial_index + 1) * 100) / self.total_trials).min(100) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percent() {
        let progress = TrialProgress {
            trial_index: 2,
            total_trials: 6,
            next_amplitude: 0.5,
            valid_so_far: 3,
            result: TrialResult::default(),
        };
        assert_eq!(progress.percent(), 50);
        assert!(!progress.is_last());

        let last = TrialProgress {
            trial_index: 5,
            ..progress
        };
        assert_eq!(last.percent(), 100);
        assert!(last.is_last());
    }
}
