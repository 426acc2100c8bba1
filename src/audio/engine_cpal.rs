//! CPAL backend - hardware round trip on desktop platforms
//!
//! The output callback renders the playback mixer and advances the shared
//! frame clock. The input callback stamps its blocks on that same clock:
//! the first input block is anchored at the output frame count observed when
//! it arrives, and every later block follows contiguously from it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use super::backend::AudioBackend;
use super::clock::{AudioClock, FrameClock};
use super::gate::{gate_pair, GateHandle};
use super::playback::{playback_pair, PlaybackHandle};
use crate::config::AudioConfig;
use crate::error::AudioError;

pub struct CpalBackend {
    _input_stream: cpal::Stream,
    _output_stream: cpal::Stream,
    clock: Arc<FrameClock>,
    playback: PlaybackHandle,
    gate: GateHandle,
    /// Set by the stream error callbacks
    failed: Arc<AtomicBool>,
}

fn stream_config(channels: cpal::ChannelCount, sample_rate: u32) -> cpal::StreamConfig {
    cpal::StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    }
}

fn check_format(format: cpal::SampleFormat, direction: &str) -> Result<(), AudioError> {
    if format == cpal::SampleFormat::F32 {
        Ok(())
    } else {
        Err(AudioError::UnsupportedFormat {
            format: format!("{} sample format {:?}, only f32 is supported", direction, format),
        })
    }
}

/// Host errors carry only a description; a refused microphone is told apart by its wording
fn map_backend_error(err: cpal::BackendSpecificError) -> AudioError {
    let description = err.description.to_lowercase();
    if ["permission", "not authorized", "access denied"]
        .iter()
        .any(|needle| description.contains(needle))
    {
        AudioError::PermissionDenied
    } else {
        AudioError::HardwareError {
            details: err.description,
        }
    }
}

fn map_build_error(err: cpal::BuildStreamError) -> AudioError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => AudioError::NoDevice {
            direction: "duplex".to_string(),
        },
        cpal::BuildStreamError::StreamConfigNotSupported => AudioError::UnsupportedFormat {
            format: "requested stream configuration".to_string(),
        },
        cpal::BuildStreamError::BackendSpecific { err } => map_backend_error(err),
        other => AudioError::StreamOpenFailed {
            reason: other.to_string(),
        },
    }
}

fn map_default_config_error(err: cpal::DefaultStreamConfigError, direction: &str) -> AudioError {
    match err {
        cpal::DefaultStreamConfigError::DeviceNotAvailable => AudioError::NoDevice {
            direction: direction.to_string(),
        },
        cpal::DefaultStreamConfigError::BackendSpecific { err } => map_backend_error(err),
        other => AudioError::StreamOpenFailed {
            reason: format!("Failed to get default {} config: {}", direction, other),
        },
    }
}

fn map_play_error(err: cpal::PlayStreamError, direction: &str) -> AudioError {
    match err {
        cpal::PlayStreamError::BackendSpecific { err } => map_backend_error(err),
        other => AudioError::StreamFailure {
            reason: format!("{} start failed: {}", direction, other),
        },
    }
}

impl CpalBackend {
    /// Open and start the default input and output devices
    pub fn open(audio: &AudioConfig) -> Result<Self, AudioError> {
        audio.validate().map_err(|e| AudioError::UnsupportedFormat {
            format: e.to_string(),
        })?;

        let host = cpal::default_host();
        let output_device = host.default_output_device().ok_or_else(|| AudioError::NoDevice {
            direction: "output".to_string(),
        })?;
        let input_device = host.default_input_device().ok_or_else(|| AudioError::NoDevice {
            direction: "input".to_string(),
        })?;

        let output_default = output_device
            .default_output_config()
            .map_err(|e| map_default_config_error(e, "output"))?;
        let input_default = input_device
            .default_input_config()
            .map_err(|e| map_default_config_error(e, "input"))?;
        check_format(output_default.sample_format(), "output")?;
        check_format(input_default.sample_format(), "input")?;

        let clock = Arc::new(FrameClock::new(audio.sample_rate));
        let (mut mixer, playback) = playback_pair();
        let (mut gate, gate_handle) = gate_pair(audio.sample_rate, audio.block_size, audio);
        let failed = Arc::new(AtomicBool::new(false));
        let block_size = audio.block_size;

        let output_config = stream_config(output_default.channels(), audio.sample_rate);
        let output_channels = output_config.channels as usize;
        let output_clock = Arc::clone(&clock);
        let mut mono = vec![0.0f32; block_size];
        let output_failed = Arc::clone(&failed);

        let output_stream = output_device
            .build_output_stream(
                &output_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for frames in data.chunks_mut(block_size * output_channels) {
                        let frame_count = frames.len() / output_channels;
                        let block = &mut mono[..frame_count];
                        mixer.render(output_clock.frames(), block);
                        for (frame, &sample) in frames.chunks_mut(output_channels).zip(block.iter()) {
                            frame.fill(sample);
                        }
                        output_clock.advance(frame_count as u64);
                    }
                },
                move |err| {
                    log::error!("[CpalBackend] Output stream error: {}", err);
                    output_failed.store(true, Ordering::Relaxed);
                },
                None,
            )
            .map_err(map_build_error)?;

        let input_config = stream_config(input_default.channels(), audio.sample_rate);
        let input_channels = input_config.channels as usize;
        let input_clock = Arc::clone(&clock);
        let mut scratch = vec![0.0f32; block_size];
        let mut input_frame: Option<u64> = None;
        let input_failed = Arc::clone(&failed);

        let input_stream = input_device
            .build_input_stream(
                &input_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mut frame = *input_frame.get_or_insert_with(|| input_clock.frames());
                    for frames in data.chunks(block_size * input_channels) {
                        let frame_count = frames.len() / input_channels;
                        // De-interleave: take first channel
                        for (dst, src) in scratch.iter_mut().zip(frames.chunks(input_channels)) {
                            *dst = src[0];
                        }
                        gate.process(input_clock.frame_to_time(frame), &scratch[..frame_count], None);
                        frame += frame_count as u64;
                    }
                    input_frame = Some(frame);
                },
                move |err| {
                    log::error!("[CpalBackend] Input stream error: {}", err);
                    input_failed.store(true, Ordering::Relaxed);
                },
                None,
            )
            .map_err(map_build_error)?;

        output_stream.play().map_err(|e| map_play_error(e, "Output"))?;
        input_stream.play().map_err(|e| map_play_error(e, "Input"))?;

        log::info!(
            "[CpalBackend] Streams started: {} Hz, {} in / {} out channels, block {}",
            audio.sample_rate,
            input_channels,
            output_channels,
            block_size
        );

        Ok(Self {
            _input_stream: input_stream,
            _output_stream: output_stream,
            clock,
            playback,
            gate: gate_handle,
            failed,
        })
    }

    fn check_streams(&self) -> Result<(), AudioError> {
        if self.failed.load(Ordering::Relaxed) {
            Err(AudioError::StreamFailure {
                reason: "audio stream reported an error".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

impl AudioBackend for CpalBackend {
    fn clock(&self) -> Arc<dyn AudioClock> {
        self.clock.clone()
    }

    fn play_at(&mut self, samples: Arc<[f32]>, start_time: f64) -> Result<(), AudioError> {
        self.check_streams()?;
        let start_frame = self.clock.time_to_frame(start_time);
        self.playback.schedule(samples, start_frame)
    }

    fn gate(&mut self) -> &mut GateHandle {
        &mut self.gate
    }
}
