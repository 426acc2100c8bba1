// Analysis module - lag estimation and capture diagnostics
//
// Pure numeric code running on the coordination side only; nothing here is
// called from the audio callback.

pub mod correlation;
pub mod filter;
pub mod level;

pub use correlation::{estimate_lag, LagEstimate, LagSearch};
pub use filter::{high_pass, HighPassFilter};
pub use level::{is_clipped, peak, rms, SignalLevel};
