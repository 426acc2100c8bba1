//! Recording gate - sample-accurate capture window inside the audio callback
//!
//! The gate is an owned state machine moved into the real-time input
//! callback. It turns absolute start/end times into exact sample offsets
//! within each fixed-size block and streams the captured samples out as
//! pooled chunks.
//!
//! ```text
//! Idle ──StartAt/SetWindow──> Armed ──start ∈ [t0, t1)──> Recording
//!   ^                                                        │
//!   └──────── target reached | end time reached | Stop ──────┘
//! ```
//!
//! # Real-Time Safety
//! `RecordingGate::process` only reads timestamps, copies samples into
//! pre-allocated buffers and pushes onto lock-free rings. It never blocks,
//! never logs and never allocates as long as blocks fit the pool buffer
//! capacity. Anomalies are counted and reported in the `Done` summary.
//!
//! The coordinator talks to the gate only through [`GateHandle`]: scalar
//! commands go in, chunks and the completion signal come out. Commands go
//! through a single latest-wins slot, so a callback that stops running can
//! never back up the coordinator. Every window carries an id that is echoed
//! in its chunks and its summary.

use std::sync::atomic::{fence, AtomicU64, Ordering};
use std::sync::Arc;

use rtrb::{Consumer, Producer};
use serde::{Deserialize, Serialize};

use super::buffer_pool::{AudioBuffer, BufferPool};
use crate::config::AudioConfig;

/// Tolerance (in samples) applied before flooring a time offset, so clock
/// values that are an exact sample index minus rounding noise land on that
/// index rather than the one before it
const OFFSET_EPSILON: f64 = 1e-6;

/// Commands from the coordinator to the gate
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateCommand {
    /// Start recording at `start_time`, optionally stopping after `sample_target` samples
    StartAt {
        window: u64,
        start_time: f64,
        sample_target: Option<usize>,
    },
    /// Record exactly the span `[start_time, end_time)`
    SetWindow {
        window: u64,
        start_time: f64,
        end_time: f64,
    },
    /// Abort the pending or running window
    Stop,
}

/// Why a window finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoneReason {
    TargetReached,
    EndTimeReached,
    Stopped,
}

/// Completion report for one window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateSummary {
    /// Id of the window this summary closes
    pub window: u64,
    /// Samples delivered in chunks
    pub emitted_samples: usize,
    /// Samples lost because the pool or event queue was exhausted
    pub dropped_samples: usize,
    /// How far past the armed start time the first block began
    pub late_start_samples: usize,
    pub reason: DoneReason,
}

/// Owned copy of one block slice
#[derive(Debug)]
pub struct CaptureChunk {
    /// Id of the window the samples belong to
    pub window: u64,
    /// Position of the first sample inside the window
    pub window_offset: usize,
    /// Absolute time of the first sample
    pub start_time: f64,
    pub samples: AudioBuffer,
    /// Matching slice of the reference tap, when the backend provides one
    pub reference: Option<AudioBuffer>,
}

/// Events from the gate to the coordinator
#[derive(Debug)]
pub enum GateEvent {
    Chunk(CaptureChunk),
    Done(GateSummary),
}

impl GateEvent {
    /// Id of the window the event belongs to
    pub fn window(&self) -> u64 {
        match self {
            GateEvent::Chunk(chunk) => chunk.window,
            GateEvent::Done(summary) => summary.window,
        }
    }
}

/// Observable gate state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStatus {
    Idle,
    Armed,
    Recording,
}

#[derive(Debug, Clone, Copy)]
enum GateState {
    Idle,
    Armed {
        window: u64,
        start_time: f64,
        end_time: Option<f64>,
        sample_target: Option<usize>,
    },
    Recording {
        window: u64,
        end_time: Option<f64>,
        sample_target: Option<usize>,
    },
}

const KIND_START_AT: u64 = 0;
const KIND_SET_WINDOW: u64 = 1;
const KIND_STOP: u64 = 2;
const NO_TARGET: u64 = u64::MAX;

/// Latest-wins command slot shared by one writer and one reader
///
/// `sequence` is odd while a write is in progress. A command published
/// before the gate read the previous one replaces it.
#[derive(Default)]
struct CommandSlot {
    sequence: AtomicU64,
    kind: AtomicU64,
    window: AtomicU64,
    start_time: AtomicU64,
    end_time: AtomicU64,
    sample_target: AtomicU64,
}

impl CommandSlot {
    fn publish(&self, command: GateCommand) {
        let (kind, window, start_time, end_time, sample_target) = match command {
            GateCommand::StartAt {
                window,
                start_time,
                sample_target,
            } => (
                KIND_START_AT,
                window,
                start_time,
                0.0,
                sample_target.map_or(NO_TARGET, |t| t as u64),
            ),
            GateCommand::SetWindow {
                window,
                start_time,
                end_time,
            } => (KIND_SET_WINDOW, window, start_time, end_time, NO_TARGET),
            GateCommand::Stop => (KIND_STOP, 0, 0.0, 0.0, NO_TARGET),
        };

        let sequence = self.sequence.load(Ordering::Relaxed);
        self.sequence.store(sequence.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);
        self.kind.store(kind, Ordering::Relaxed);
        self.window.store(window, Ordering::Relaxed);
        self.start_time.store(start_time.to_bits(), Ordering::Relaxed);
        self.end_time.store(end_time.to_bits(), Ordering::Relaxed);
        self.sample_target.store(sample_target, Ordering::Relaxed);
        self.sequence.store(sequence.wrapping_add(2), Ordering::Release);
    }

    /// Newest command not yet seen, if one is fully written
    fn take(&self, last_seen: &mut u64) -> Option<GateCommand> {
        let before = self.sequence.load(Ordering::Acquire);
        if before == *last_seen || before & 1 == 1 {
            return None;
        }
        let kind = self.kind.load(Ordering::Relaxed);
        let window = self.window.load(Ordering::Relaxed);
        let start_time = f64::from_bits(self.start_time.load(Ordering::Relaxed));
        let end_time = f64::from_bits(self.end_time.load(Ordering::Relaxed));
        let sample_target = self.sample_target.load(Ordering::Relaxed);
        fence(Ordering::Acquire);
        if self.sequence.load(Ordering::Relaxed) != before {
            // Torn read, retry on the next block
            return None;
        }
        *last_seen = before;

        Some(match kind {
            KIND_START_AT => GateCommand::StartAt {
                window,
                start_time,
                sample_target: (sample_target != NO_TARGET).then_some(sample_target as usize),
            },
            KIND_SET_WINDOW => GateCommand::SetWindow {
                window,
                start_time,
                end_time,
            },
            _ => GateCommand::Stop,
        })
    }
}

/// Real-time side of the gate
pub struct RecordingGate {
    sample_rate: f64,
    state: GateState,
    /// Window samples elapsed so far, emitted or dropped
    position: usize,
    emitted: usize,
    dropped: usize,
    late: usize,
    pending_done: Option<GateSummary>,
    commands: Arc<CommandSlot>,
    last_command: u64,
    events: Producer<GateEvent>,
    pool: Consumer<AudioBuffer>,
}

/// Coordinator side of the gate
pub struct GateHandle {
    commands: Arc<CommandSlot>,
    last_window: u64,
    events: Consumer<GateEvent>,
    pool: Producer<AudioBuffer>,
}

/// Build a connected gate and handle
///
/// Pool buffers are sized to `max_block` samples; the pool holds
/// `config.chunk_pool_size` buffers and the event ring
/// `config.event_queue_capacity` events.
pub fn gate_pair(sample_rate: u32, max_block: usize, config: &AudioConfig) -> (RecordingGate, GateHandle) {
    let commands = Arc::new(CommandSlot::default());
    let (event_producer, event_consumer) = rtrb::RingBuffer::new(config.event_queue_capacity.max(2));
    let pool = BufferPool::new(config.chunk_pool_size.max(2), max_block.max(1));

    let gate = RecordingGate {
        sample_rate: sample_rate as f64,
        state: GateState::Idle,
        position: 0,
        emitted: 0,
        dropped: 0,
        late: 0,
        pending_done: None,
        commands: Arc::clone(&commands),
        last_command: 0,
        events: event_producer,
        pool: pool.pool_consumer,
    };
    let handle = GateHandle {
        commands,
        last_window: 0,
        events: event_consumer,
        pool: pool.pool_producer,
    };
    (gate, handle)
}

impl RecordingGate {
    pub fn status(&self) -> GateStatus {
        match self.state {
            GateState::Idle => GateStatus::Idle,
            GateState::Armed { .. } => GateStatus::Armed,
            GateState::Recording { .. } => GateStatus::Recording,
        }
    }

    /// Process one block whose first sample is at `block_start_time`
    ///
    /// `reference` is the parallel copy of the emitted signal for the same
    /// block, if the backend taps it.
    pub fn process(&mut self, block_start_time: f64, capture: &[f32], reference: Option<&[f32]>) {
        self.flush_pending_done();
        if let Some(command) = self.commands.take(&mut self.last_command) {
            self.apply(command);
        }

        let block_len = capture.len();
        if block_len == 0 {
            return;
        }

        let mut from = 0;
        if let GateState::Armed {
            window,
            start_time,
            end_time,
            sample_target,
        } = self.state
        {
            let offset = self.offset_in_block(start_time, block_start_time);
            if offset >= block_len as f64 {
                return;
            }
            if offset < 0.0 {
                // Missed samples stay on the window timeline as a gap
                self.late = (-offset) as usize;
                self.position = self.late;
            } else {
                from = offset as usize;
            }
            self.state = GateState::Recording {
                window,
                end_time,
                sample_target,
            };
        }

        let GateState::Recording {
            window,
            end_time,
            sample_target,
        } = self.state
        else {
            return;
        };

        let mut to = block_len;
        let mut finished = None;
        if let Some(end_time) = end_time {
            let offset = self.offset_in_block(end_time, block_start_time);
            if offset < block_len as f64 {
                to = (offset.max(0.0) as usize).clamp(from, block_len);
                finished = Some(DoneReason::EndTimeReached);
            }
        }
        if let Some(target) = sample_target {
            let remaining = target.saturating_sub(self.position);
            if to - from >= remaining {
                to = from + remaining;
                finished = Some(DoneReason::TargetReached);
            }
        }

        if to > from {
            let start_time = block_start_time + from as f64 / self.sample_rate;
            let reference = reference.and_then(|r| r.get(from..to));
            self.emit(window, start_time, &capture[from..to], reference);
        }

        if let Some(reason) = finished {
            self.finish(reason);
        }
    }

    fn apply(&mut self, command: GateCommand) {
        if !matches!(self.state, GateState::Idle) {
            // A new window or an explicit stop closes the current one
            self.finish(DoneReason::Stopped);
        }
        self.state = match command {
            GateCommand::StartAt {
                window,
                start_time,
                sample_target,
            } => GateState::Armed {
                window,
                start_time,
                end_time: None,
                sample_target,
            },
            GateCommand::SetWindow {
                window,
                start_time,
                end_time,
            } => GateState::Armed {
                window,
                start_time,
                end_time: Some(end_time),
                sample_target: None,
            },
            GateCommand::Stop => GateState::Idle,
        };
    }

    /// Floored sample offset of `time` relative to the block start
    #[inline]
    fn offset_in_block(&self, time: f64, block_start_time: f64) -> f64 {
        ((time - block_start_time) * self.sample_rate + OFFSET_EPSILON).floor()
    }

    fn emit(&mut self, window: u64, start_time: f64, samples: &[f32], reference: Option<&[f32]>) {
        let window_offset = self.position;
        self.position += samples.len();

        // Keep one event slot free for the completion signal
        if self.events.slots() < 2 {
            self.dropped += samples.len();
            return;
        }
        let Ok(mut buffer) = self.pool.pop() else {
            self.dropped += samples.len();
            return;
        };
        buffer.clear();
        buffer.extend_from_slice(samples);

        // A missing reference buffer degrades the chunk, it does not drop it
        let reference = reference.and_then(|slice| {
            self.pool.pop().ok().map(|mut copy| {
                copy.clear();
                copy.extend_from_slice(slice);
                copy
            })
        });

        let chunk = CaptureChunk {
            window,
            window_offset,
            start_time,
            samples: buffer,
            reference,
        };
        if self.events.push(GateEvent::Chunk(chunk)).is_ok() {
            self.emitted += samples.len();
        } else {
            self.dropped += samples.len();
        }
    }

    fn finish(&mut self, reason: DoneReason) {
        let window = match self.state {
            GateState::Idle => 0,
            GateState::Armed { window, .. } | GateState::Recording { window, .. } => window,
        };
        let summary = GateSummary {
            window,
            emitted_samples: self.emitted,
            dropped_samples: self.dropped,
            late_start_samples: self.late,
            reason,
        };
        self.state = GateState::Idle;
        self.position = 0;
        self.emitted = 0;
        self.dropped = 0;
        self.late = 0;

        if self.events.push(GateEvent::Done(summary)).is_err() {
            self.pending_done = Some(summary);
        }
    }

    fn flush_pending_done(&mut self) {
        if let Some(summary) = self.pending_done.take() {
            if self.events.push(GateEvent::Done(summary)).is_err() {
                self.pending_done = Some(summary);
            }
        }
    }
}

impl GateHandle {
    /// Hand a command to the gate, replacing one it has not picked up yet
    pub fn send(&mut self, command: GateCommand) {
        self.commands.publish(command);
    }

    fn next_window(&mut self) -> u64 {
        self.last_window += 1;
        self.last_window
    }

    /// Id of the most recently armed window
    pub fn current_window(&self) -> u64 {
        self.last_window
    }

    /// Arm the gate for `start_time`, finishing after `sample_target` samples
    ///
    /// Returns the new window's id.
    pub fn start_at(&mut self, start_time: f64, sample_target: Option<usize>) -> u64 {
        let window = self.next_window();
        self.send(GateCommand::StartAt {
            window,
            start_time,
            sample_target,
        });
        window
    }

    /// Arm the gate for the span `[start_time, end_time)` and return its id
    pub fn set_window(&mut self, start_time: f64, end_time: f64) -> u64 {
        let window = self.next_window();
        self.send(GateCommand::SetWindow {
            window,
            start_time,
            end_time,
        });
        window
    }

    pub fn stop(&mut self) {
        self.send(GateCommand::Stop);
    }

    pub fn try_recv(&mut self) -> Option<GateEvent> {
        self.events.pop().ok()
    }

    /// Return a chunk buffer to the pool
    pub fn recycle(&mut self, mut buffer: AudioBuffer) {
        buffer.clear();
        // The pool ring is sized for every buffer, so this only fails if a
        // foreign buffer is recycled; dropping it is harmless
        let _ = self.pool.push(buffer);
    }

    /// Return a chunk's buffers to the pool
    pub fn recycle_chunk(&mut self, chunk: CaptureChunk) {
        self.recycle(chunk.samples);
        if let Some(reference) = chunk.reference {
            self.recycle(reference);
        }
    }

    /// Discard queued events, e.g. the tail of an abandoned window
    pub fn drain(&mut self) -> usize {
        let mut discarded = 0;
        while let Some(event) = self.try_recv() {
            if let GateEvent::Chunk(chunk) = event {
                self.recycle_chunk(chunk);
            }
            discarded += 1;
        }
        discarded
    }
}
