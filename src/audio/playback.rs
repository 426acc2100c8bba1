//! Playback mixer - sample-accurate scheduled output
//!
//! The coordinator queues a buffer together with the absolute frame at
//! which its first sample must leave the output. The output callback owns a
//! [`PlaybackMixer`] and sums every active voice into each block, starting a
//! voice at the exact frame offset inside the block where it is due.

use std::sync::Arc;

use rtrb::{Consumer, Producer};

use crate::error::AudioError;

/// Maximum number of simultaneously scheduled buffers
pub const MAX_VOICES: usize = 8;

const COMMAND_QUEUE_CAPACITY: usize = 16;

/// Request to play `samples` starting at `start_frame`
#[derive(Debug, Clone)]
pub struct PlaybackCommand {
    pub samples: Arc<[f32]>,
    pub start_frame: u64,
}

#[derive(Debug)]
struct Voice {
    samples: Arc<[f32]>,
    start_frame: u64,
}

impl Voice {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// Output-callback side of the scheduler
pub struct PlaybackMixer {
    voices: [Option<Voice>; MAX_VOICES],
    commands: Consumer<PlaybackCommand>,
}

/// Coordinator side of the scheduler
pub struct PlaybackHandle {
    commands: Producer<PlaybackCommand>,
}

pub fn playback_pair() -> (PlaybackMixer, PlaybackHandle) {
    let (producer, consumer) = rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY);
    (
        PlaybackMixer {
            voices: Default::default(),
            commands: consumer,
        },
        PlaybackHandle { commands: producer },
    )
}

impl PlaybackMixer {
    /// Render one mono block whose first frame is `block_start_frame`
    ///
    /// `out` is overwritten. A voice whose start frame has already passed
    /// plays its remaining tail from the block start.
    pub fn render(&mut self, block_start_frame: u64, out: &mut [f32]) {
        while let Ok(command) = self.commands.pop() {
            if let Some(slot) = self.voices.iter_mut().find(|v| v.is_none()) {
                *slot = Some(Voice {
                    samples: command.samples,
                    start_frame: command.start_frame,
                });
            }
        }

        out.fill(0.0);
        let block_end_frame = block_start_frame + out.len() as u64;

        for slot in self.voices.iter_mut() {
            let Some(voice) = slot else { continue };

            if voice.start_frame < block_end_frame {
                let first = voice.start_frame.max(block_start_frame);
                let last = voice.end_frame().min(block_end_frame);
                for frame in first..last {
                    let out_index = (frame - block_start_frame) as usize;
                    let sample_index = (frame - voice.start_frame) as usize;
                    out[out_index] += voice.samples[sample_index];
                }
            }

            if voice.end_frame() <= block_end_frame {
                *slot = None;
            }
        }
    }

    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| v.is_some()).count()
    }
}

impl PlaybackHandle {
    pub fn schedule(&mut self, samples: Arc<[f32]>, start_frame: u64) -> Result<(), AudioError> {
        self.commands
            .push(PlaybackCommand {
                samples,
                start_frame,
            })
            .map_err(|_| AudioError::QueueFull {
                queue: "playback commands".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize) -> Arc<[f32]> {
        (1..=len).map(|i| i as f32).collect::<Vec<_>>().into()
    }

    #[test]
    fn test_voice_starts_at_exact_frame() {
        let (mut mixer, mut handle) = playback_pair();
        handle.schedule(ramp(4), 130).unwrap();

        let mut out = vec![0.0f32; 128];
        mixer.render(0, &mut out);
        assert!(out.iter().all(|&s| s == 0.0));

        mixer.render(128, &mut out);
        assert_eq!(&out[..6], &[0.0, 0.0, 1.0, 2.0, 3.0, 4.0]);
        assert!(out[6..].iter().all(|&s| s == 0.0));
        assert_eq!(mixer.active_voices(), 0);
    }

    #[test]
    fn test_voice_spans_blocks() {
        let (mut mixer, mut handle) = playback_pair();
        handle.schedule(ramp(10), 6).unwrap();

        let mut out = vec![0.0f32; 8];
        mixer.render(0, &mut out);
        assert_eq!(&out[6..], &[1.0, 2.0]);
        assert_eq!(mixer.active_voices(), 1);

        mixer.render(8, &mut out);
        assert_eq!(out, vec![3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0]);
        assert_eq!(mixer.active_voices(), 0);
    }

    #[test]
    fn test_voices_are_summed() {
        let (mut mixer, mut handle) = playback_pair();
        let ones: Arc<[f32]> = vec![0.25f32; 4].into();
        handle.schedule(Arc::clone(&ones), 0).unwrap();
        handle.schedule(ones, 2).unwrap();

        let mut out = vec![0.0f32; 8];
        mixer.render(0, &mut out);
        assert_eq!(out, vec![0.25, 0.25, 0.5, 0.5, 0.25, 0.25, 0.0, 0.0]);
    }

    #[test]
    fn test_late_voice_plays_tail() {
        let (mut mixer, mut handle) = playback_pair();
        handle.schedule(ramp(6), 2).unwrap();

        let mut out = vec![0.0f32; 4];
        mixer.render(4, &mut out);
        assert_eq!(out, vec![3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_queue_full_is_reported() {
        let (_mixer, mut handle) = playback_pair();
        let samples: Arc<[f32]> = vec![0.0f32; 1].into();
        for _ in 0..COMMAND_QUEUE_CAPACITY {
            handle.schedule(Arc::clone(&samples), 0).unwrap();
        }
        assert!(matches!(
            handle.schedule(samples, 0),
            Err(AudioError::QueueFull { .. })
        ));
    }
}
