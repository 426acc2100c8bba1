//! Simulated loopback backend
//!
//! Runs the same real-time pipeline as a hardware backend on a dedicated
//! thread: the playback mixer renders each block, the rendered block passes
//! through a fixed delay line (the simulated round trip), gain, DC offset and
//! noise, and the result feeds the recording gate. The frame clock advances
//! one block at a time, paced against wall time by `speed`.
//!
//! Used by the CLI `--simulate` mode and by the integration tests, where the
//! true latency is known exactly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::backend::AudioBackend;
use super::clock::{AudioClock, FrameClock};
use super::gate::{gate_pair, GateHandle, RecordingGate};
use super::playback::{playback_pair, PlaybackHandle, PlaybackMixer};
use crate::config::AudioConfig;
use crate::error::AudioError;

/// Simulated signal path parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopbackConfig {
    /// Round-trip delay in milliseconds
    pub latency_ms: f64,
    /// Linear gain applied to the delayed signal
    pub gain: f32,
    /// Peak amplitude of uniform white noise added to the capture
    pub noise_level: f32,
    pub dc_offset: f32,
    pub seed: u64,
    /// Clock speed relative to wall time (2.0 runs twice as fast)
    pub speed: f64,
    /// Attach the undelayed output to every captured chunk
    pub reference_tap: bool,
    /// When false the input side never reaches the gate (dead microphone)
    pub capture_enabled: bool,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            latency_ms: 20.0,
            gain: 0.8,
            noise_level: 0.0,
            dc_offset: 0.0,
            seed: 7,
            speed: 1.0,
            reference_tap: false,
            capture_enabled: true,
        }
    }
}

impl LoopbackConfig {
    pub fn latency_samples(&self, sample_rate: u32) -> usize {
        (self.latency_ms * sample_rate as f64 / 1000.0).round().max(0.0) as usize
    }
}

/// Fixed-length delay line; zero length passes samples straight through
struct DelayLine {
    line: Vec<f32>,
    index: usize,
}

impl DelayLine {
    fn new(delay: usize) -> Self {
        Self {
            line: vec![0.0; delay],
            index: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        if self.line.is_empty() {
            return input;
        }
        let output = self.line[self.index];
        self.line[self.index] = input;
        self.index = (self.index + 1) % self.line.len();
        output
    }
}

/// State owned by the simulation thread
struct LoopbackWorker {
    config: LoopbackConfig,
    block_size: usize,
    clock: Arc<FrameClock>,
    mixer: PlaybackMixer,
    gate: RecordingGate,
    delay: DelayLine,
    rng: StdRng,
    running: Arc<AtomicBool>,
}

impl LoopbackWorker {
    fn run(mut self) {
        let mut output = vec![0.0f32; self.block_size];
        let mut capture = vec![0.0f32; self.block_size];
        let block_period = Duration::from_secs_f64(
            self.block_size as f64 / self.clock.sample_rate() as f64 / self.config.speed,
        );
        let mut deadline = Instant::now();

        while self.running.load(Ordering::Relaxed) {
            let frame = self.clock.frames();
            self.mixer.render(frame, &mut output);

            for (captured, &emitted) in capture.iter_mut().zip(output.iter()) {
                let mut sample = self.delay.process(emitted) * self.config.gain + self.config.dc_offset;
                if self.config.noise_level > 0.0 {
                    sample += self.rng.gen_range(-1.0f32..1.0) * self.config.noise_level;
                }
                *captured = sample.clamp(-1.0, 1.0);
            }

            if self.config.capture_enabled {
                let tap = self.config.reference_tap.then_some(&output[..]);
                self.gate.process(self.clock.frame_to_time(frame), &capture, tap);
            }
            self.clock.advance(self.block_size as u64);

            deadline += block_period;
            let now = Instant::now();
            if deadline > now {
                std::thread::sleep(deadline - now);
            } else if now - deadline > block_period * 64 {
                // Fell far behind (debugger, overloaded CI); resync instead of bursting
                deadline = now;
            }
        }
    }
}

/// Backend whose input is its own delayed output
pub struct LoopbackBackend {
    clock: Arc<FrameClock>,
    playback: PlaybackHandle,
    gate: GateHandle,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    reference_tap: bool,
}

impl LoopbackBackend {
    /// Start the simulation thread
    pub fn start(audio: &AudioConfig, config: LoopbackConfig) -> Result<Self, AudioError> {
        audio.validate().map_err(|e| AudioError::UnsupportedFormat {
            format: e.to_string(),
        })?;
        if !(config.speed > 0.0 && config.speed.is_finite()) {
            return Err(AudioError::UnsupportedFormat {
                format: format!("loopback speed must be positive, got {}", config.speed),
            });
        }

        let clock = Arc::new(FrameClock::new(audio.sample_rate));
        let (mixer, playback) = playback_pair();
        let (gate, gate_handle) = gate_pair(audio.sample_rate, audio.block_size, audio);
        let running = Arc::new(AtomicBool::new(true));
        let latency_samples = config.latency_samples(audio.sample_rate);
        let reference_tap = config.reference_tap;

        log::info!(
            "[Loopback] Starting: {} Hz, block {}, latency {} samples ({:.2} ms), speed {}x",
            audio.sample_rate,
            audio.block_size,
            latency_samples,
            config.latency_ms,
            config.speed
        );

        let worker = LoopbackWorker {
            block_size: audio.block_size,
            clock: Arc::clone(&clock),
            mixer,
            gate,
            delay: DelayLine::new(latency_samples),
            rng: StdRng::seed_from_u64(config.seed),
            running: Arc::clone(&running),
            config,
        };

        let thread = std::thread::Builder::new()
            .name("loopback-audio".to_string())
            .spawn(move || worker.run())
            .map_err(|e| AudioError::StreamOpenFailed {
                reason: format!("failed to spawn loopback thread: {}", e),
            })?;

        Ok(Self {
            clock,
            playback,
            gate: gate_handle,
            running,
            thread: Some(thread),
            reference_tap,
        })
    }

    pub fn frame_clock(&self) -> &FrameClock {
        &self.clock
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("[Loopback] Simulation thread panicked");
            }
        }
    }
}

impl AudioBackend for LoopbackBackend {
    fn clock(&self) -> Arc<dyn AudioClock> {
        self.clock.clone()
    }

    fn play_at(&mut self, samples: Arc<[f32]>, start_time: f64) -> Result<(), AudioError> {
        if self.thread.is_none() {
            return Err(AudioError::BackendClosed);
        }
        let start_frame = self.clock.time_to_frame(start_time);
        self.playback.schedule(samples, start_frame)
    }

    fn gate(&mut self) -> &mut GateHandle {
        &mut self.gate
    }

    fn has_reference_tap(&self) -> bool {
        self.reference_tap
    }
}

impl Drop for LoopbackBackend {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::gate::GateEvent;

    #[test]
    fn test_delay_line() {
        let mut line = DelayLine::new(3);
        let out: Vec<f32> = [1.0, 2.0, 3.0, 4.0, 5.0].iter().map(|&s| line.process(s)).collect();
        assert_eq!(out, vec![0.0, 0.0, 0.0, 1.0, 2.0]);

        let mut passthrough = DelayLine::new(0);
        assert_eq!(passthrough.process(0.5), 0.5);
    }

    #[test]
    fn test_latency_samples() {
        let config = LoopbackConfig {
            latency_ms: 12.5,
            ..LoopbackConfig::default()
        };
        assert_eq!(config.latency_samples(48_000), 600);
    }

    #[test]
    fn test_rejects_non_positive_speed() {
        let config = LoopbackConfig {
            speed: 0.0,
            ..LoopbackConfig::default()
        };
        assert!(LoopbackBackend::start(&AudioConfig::default(), config).is_err());
    }

    #[test]
    fn test_clock_advances_and_gate_delivers() {
        let audio = AudioConfig {
            sample_rate: 16_000,
            block_size: 64,
            ..AudioConfig::default()
        };
        let config = LoopbackConfig {
            speed: 8.0,
            ..LoopbackConfig::default()
        };
        let mut backend = LoopbackBackend::start(&audio, config).unwrap();
        let start = backend.clock().now() + 0.02;
        backend.gate().start_at(start, Some(256));

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut received = 0;
        let mut done = false;
        while !done && Instant::now() < deadline {
            match backend.gate().try_recv() {
                Some(GateEvent::Chunk(chunk)) => {
                    received += chunk.samples.len();
                    backend.gate().recycle_chunk(chunk);
                }
                Some(GateEvent::Done(_)) => done = true,
                None => std::thread::sleep(Duration::from_millis(1)),
            }
        }
        assert!(done, "gate window should complete");
        assert_eq!(received, 256);
        assert!(backend.clock().now() >= start);
    }

    #[test]
    fn test_play_after_stop_fails() {
        let mut backend = LoopbackBackend::start(&AudioConfig::default(), LoopbackConfig::default()).unwrap();
        backend.stop();
        let samples: Arc<[f32]> = vec![0.0f32; 4].into();
        assert!(matches!(
            backend.play_at(samples, 0.0),
            Err(AudioError::BackendClosed)
        ));
    }
}
