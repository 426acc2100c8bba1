// Audio module - real-time plumbing: clock, scheduled playback, recording gate

pub mod backend;
pub mod buffer_pool;
pub mod clock;
#[cfg(not(target_os = "android"))]
pub mod engine_cpal;
pub mod gate;
pub mod loopback;
pub mod playback;

// Re-export commonly used types for convenience
pub use backend::AudioBackend;
pub use buffer_pool::{AudioBuffer, BufferPool, BufferPoolChannels};
pub use clock::{AudioClock, FrameClock};
#[cfg(not(target_os = "android"))]
pub use engine_cpal::CpalBackend;
pub use gate::{
    gate_pair, CaptureChunk, DoneReason, GateCommand, GateEvent, GateHandle, GateStatus,
    GateSummary, RecordingGate,
};
pub use loopback::{LoopbackBackend, LoopbackConfig};
pub use playback::{playback_pair, PlaybackHandle, PlaybackMixer};
