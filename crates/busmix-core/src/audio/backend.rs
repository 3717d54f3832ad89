//! Audio system entry point
//!
//! Starting the audio system opens the output stream first, then creates the
//! mixer at the negotiated sample rate. The render half moves into the
//! stream callback; the control half is returned to the caller.

use cpal::Stream;

use super::config::AudioConfig;
use super::error::AudioResult;
use crate::engine::{EngineConfig, Mixer};

/// Result of starting the audio system
pub struct AudioSystemResult {
    /// Keeps the stream alive (drop to stop)
    pub handle: AudioHandle,
    /// Control handle for the mixer running in the callback
    pub mixer: Mixer,
    pub sample_rate: u32,
    /// Buffer size in frames requested from the device
    pub buffer_size: u32,
    /// Output latency in milliseconds (one-way)
    pub latency_ms: f32,
}

/// Handle to the running output stream
///
/// Dropping it stops audio.
///
/// Rate, buffer size and latency are reported once in [`AudioSystemResult`].
pub struct AudioHandle {
    pub(super) _stream: Stream,
    pub(super) device_name: String,
    pub(super) channels: u16,
}

impl AudioHandle {
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Device channels; the mix goes to the first two
    pub fn channels(&self) -> u16 {
        self.channels
    }
}

/// Open the output device and start mixing into it
///
/// `engine.sample_rate` is replaced by the rate negotiated with the device.
pub fn start_audio_system(
    config: &AudioConfig,
    engine: EngineConfig,
) -> AudioResult<AudioSystemResult> {
    super::cpal_backend::start_audio_system(config, engine)
}
