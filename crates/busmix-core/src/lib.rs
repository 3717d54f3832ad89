//! Busmix Core - real-time mixing engine
//!
//! A small graph of decodable sources streams through a fixed-point
//! resampler into gain/pan-adjusted buffers, summed into destination buses
//! and finally into one master bus consumed by the hardware callback.

pub mod audio;
pub mod config;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod fixed;
pub mod record;
pub mod types;

pub use decoder::SampleData;
pub use engine::{create_mixer, EngineConfig, Mixer, MixEngine};
pub use error::{DecodeError, FormatError, MixerError, MixerResult};
pub use types::*;
