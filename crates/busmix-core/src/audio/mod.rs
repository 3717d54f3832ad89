//! Hardware audio output
//!
//! Opens a cpal output stream and drives the mix engine from its callback:
//!
//! - **Control thread**: owns the [`Mixer`](crate::engine::Mixer) and sends
//!   commands through the lock-free queue
//! - **Audio thread**: owns the [`MixEngine`](crate::engine::MixEngine)
//!   exclusively and copies the master bus into the device buffer
//! - **Atomics**: playback state and engine counters are read without locks
//!
//! # Example Usage
//!
//! ```ignore
//! use busmix_core::audio::{start_audio_system, AudioConfig};
//! use busmix_core::{EngineConfig, SampleData};
//!
//! let mut result = start_audio_system(&AudioConfig::default(), EngineConfig::default())?;
//! let id = result.mixer.create_source(&SampleData::from_file("loop.ogg")?)?;
//! result.mixer.play(id, true);
//! ```

mod backend;
mod config;
mod cpal_backend;
mod device;
mod error;

pub use backend::{start_audio_system, AudioHandle, AudioSystemResult};
pub use config::{
    AudioConfig, BufferSize, DeviceId, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE, MAX_BUFFER_SIZE,
    MIN_BUFFER_SIZE,
};
pub use device::{find_device_by_id, get_default_device, get_output_devices, AudioDevice};
pub use error::{AudioError, AudioResult};
