// LatencyCalibrator - one calibration trial end to end
//
// Trial sequence:
// 1. Generate the probe at the requested amplitude
// 2. Open a capture window `schedule_lead_ms` ahead of the audio clock
// 3. Arm the gate for the window and schedule the probe after the pre-roll
// 4. Await the gate's Done event, bounded by the window length plus
//    `capture_timeout_ms`
// 5. High-pass both signals (optional) and estimate the lag
// 6. Attach level diagnostics and advisory warnings
//
// Trials run strictly one at a time: the calibrator takes `&mut self` and
// owns the backend for its whole lifetime.

use std::time::Duration;

use crate::analysis::{estimate_lag, high_pass, LagEstimate, LagSearch, SignalLevel};
use crate::audio::{AudioBackend, GateEvent, GateHandle, GateSummary};
use crate::config::{CalibrationConfig, ReferenceSource};
use crate::error::{log_audio_error, CalibrationError};
use crate::probe::ProbeSignal;

use super::result::{CalibrationOutcome, QualityWarning, Selection, TrialResult};
use super::window::{ms_to_samples, CaptureAssembler, CaptureWindow, CapturedBuffer};

/// Interval between event-queue polls while waiting for a capture
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Everything a trial produced, for hosts that archive raw data
#[derive(Debug, Clone)]
pub struct TrialRecord {
    pub result: TrialResult,
    pub window: CaptureWindow,
    pub captured: CapturedBuffer,
    /// Reference the capture was correlated against, before filtering
    pub reference: Vec<f32>,
}

/// Calibration coordinator bound to one audio backend
pub struct LatencyCalibrator<B: AudioBackend> {
    backend: B,
    poll_interval: Duration,
}

impl<B: AudioBackend> LatencyCalibrator<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Run exactly one trial at the configured probe amplitude
    pub async fn calibrate(
        &mut self,
        config: &CalibrationConfig,
    ) -> Result<CalibrationOutcome, CalibrationError> {
        let record = self.run_trial(config, config.probe.amplitude).await?;
        let valid = usize::from(record.result.is_trusted(config.low_score_warning));
        Ok(CalibrationOutcome {
            result: record.result,
            selection: Selection::Single,
            valid_trials: valid,
            total_trials: 1,
        })
    }

    /// Run one trial at `amplitude` and keep its raw buffers
    ///
    /// Fails only on invalid configuration or backend errors; every signal
    /// problem is reported through the result's warnings.
    pub async fn run_trial(
        &mut self,
        config: &CalibrationConfig,
        amplitude: f32,
    ) -> Result<TrialRecord, CalibrationError> {
        let sample_rate = self.backend.sample_rate();
        config.validate(sample_rate)?;
        let probe = ProbeSignal::generate(&config.probe, sample_rate, amplitude)?;

        let clock = self.backend.clock();
        let now_frame = (clock.now() * sample_rate as f64).ceil() as u64;
        let lead = ms_to_samples(config.schedule_lead_ms, sample_rate) as u64;
        let window = CaptureWindow::new(
            now_frame + lead,
            sample_rate,
            config.pre_roll_ms,
            probe.len(),
            config.post_roll_ms,
        );

        let stale = self.backend.gate().drain();
        if stale > 0 {
            log::debug!("[Calibrator] Discarded {} stale gate events", stale);
        }

        let window_id = self
            .backend
            .gate()
            .start_at(window.start_time(), Some(window.total_samples()));
        if let Err(err) = self
            .backend
            .play_at(probe.shared_samples(), window.probe_start_time())
        {
            log_audio_error(&err, "scheduling probe playback");
            // Do not leave the gate armed for a probe that will never play
            self.backend.gate().stop();
            return Err(err.into());
        }

        log::debug!(
            "[Calibrator] Window {} armed: start {:.4}s, probe {:.4}s, {} samples ({:?} probe, amplitude {:.3})",
            window_id,
            window.start_time(),
            window.probe_start_time(),
            window.total_samples(),
            probe.kind(),
            amplitude
        );

        let remaining = (window.end_time() - clock.now()).max(0.0);
        let wait = Duration::from_secs_f64(remaining + config.capture_timeout_ms / 1000.0);
        let mut assembler = CaptureAssembler::new(window.total_samples());

        let poll_interval = self.poll_interval;
        let waited = tokio::time::timeout(
            wait,
            wait_for_capture(self.backend.gate(), window_id, &mut assembler, poll_interval),
        )
        .await;
        let summary = match waited {
            Ok(summary) => Some(summary),
            Err(_) => {
                log::warn!(
                    "[Calibrator] Capture timed out after {:?} ({} of {} samples received)",
                    wait,
                    assembler.received(),
                    window.total_samples()
                );
                self.backend.gate().stop();
                collect_pending(self.backend.gate(), window_id, &mut assembler);
                None
            }
        };
        let captured = assembler.finish(summary);

        let reference = self.select_reference(config, &window, &probe, &captured);
        let result = analyze_capture(config, sample_rate, amplitude, &captured, &reference);

        Ok(TrialRecord {
            result,
            window,
            captured,
            reference,
        })
    }

    fn select_reference(
        &self,
        config: &CalibrationConfig,
        window: &CaptureWindow,
        probe: &ProbeSignal,
        captured: &CapturedBuffer,
    ) -> Vec<f32> {
        if config.reference_source == ReferenceSource::Tap {
            match &captured.reference_tap {
                Some(tap) if self.backend.has_reference_tap() && tap.len() == window.total_samples() => {
                    return tap.clone();
                }
                _ => log::warn!("[Calibrator] Reference tap unavailable, using generated probe"),
            }
        }
        window.reference_on_timeline(probe.samples())
    }
}

/// Collect chunks of `window` until the gate reports its completion
///
/// Events left over from earlier windows are recycled and skipped.
async fn wait_for_capture(
    gate: &mut GateHandle,
    window: u64,
    assembler: &mut CaptureAssembler,
    poll_interval: Duration,
) -> GateSummary {
    loop {
        while let Some(event) = gate.try_recv() {
            match event {
                GateEvent::Chunk(chunk) if chunk.window == window => {
                    assembler.accept(&chunk);
                    gate.recycle_chunk(chunk);
                }
                GateEvent::Chunk(stale) => gate.recycle_chunk(stale),
                GateEvent::Done(summary) if summary.window == window => return summary,
                GateEvent::Done(stale) => {
                    log::debug!("[Calibrator] Ignoring completion of window {}", stale.window);
                }
            }
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Keep whatever chunks of `window` are already queued after an aborted wait
fn collect_pending(gate: &mut GateHandle, window: u64, assembler: &mut CaptureAssembler) {
    while let Some(event) = gate.try_recv() {
        if let GateEvent::Chunk(chunk) = event {
            if chunk.window == window {
                assembler.accept(&chunk);
            }
            gate.recycle_chunk(chunk);
        }
    }
}

/// Filter, correlate and diagnose one captured buffer
pub fn analyze_capture(
    config: &CalibrationConfig,
    sample_rate: u32,
    amplitude: f32,
    captured: &CapturedBuffer,
    reference: &[f32],
) -> TrialResult {
    let level = SignalLevel::measure(&captured.samples, config.clip_threshold);
    let mut warnings = Vec::new();

    let no_data = captured.summary.is_none() || captured.received_samples == 0;
    let estimate = if no_data {
        warnings.push(QualityWarning::NoData);
        LagEstimate::zero()
    } else {
        let search = LagSearch {
            max_lag_ms: config.max_lag_ms,
            allow_negative: config.allow_negative_lag,
        };
        let capture_filtered = high_pass(&captured.samples, config.high_pass_hz, sample_rate);
        let reference_filtered = high_pass(reference, config.high_pass_hz, sample_rate);
        estimate_lag(&capture_filtered, &reference_filtered, sample_rate, &search)
    };

    if !no_data {
        if estimate.score < config.low_score_warning {
            warnings.push(QualityWarning::LowConfidence);
        }
        if estimate.lag_ms.abs() > config.implausible_lag_ms {
            warnings.push(QualityWarning::ImplausibleLag);
        }
    }
    if level.clipped {
        warnings.push(QualityWarning::Clipped);
    }
    if level.rms < config.quiet_rms {
        warnings.push(QualityWarning::TooQuiet);
    }
    if captured.summary.map_or(false, |s| s.dropped_samples > 0) {
        warnings.push(QualityWarning::SamplesDropped);
    }

    log::info!(
        "[Calibrator] Trial: lag {} samples ({:.2} ms), score {:.3}, rms {:.4}, peak {:.3}",
        estimate.lag_samples,
        estimate.lag_ms,
        estimate.score,
        level.rms,
        level.peak
    );
    if !warnings.is_empty() {
        log::warn!("[Calibrator] Trial quality warnings: {:?}", warnings);
    }

    TrialResult {
        estimate,
        level,
        amplitude,
        warnings,
        captured_samples: captured.received_samples,
        gate: captured.summary,
    }
}
