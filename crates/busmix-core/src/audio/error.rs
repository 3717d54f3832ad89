//! Audio backend error types

use thiserror::Error;

use crate::error::MixerError;

/// Errors that can occur while setting up audio output
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("No audio output devices found")]
    NoDevices,

    #[error("Failed to get default audio device: {0}")]
    NoDefaultDevice(String),

    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to get device config: {0}")]
    ConfigError(String),

    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    #[error("Failed to start audio stream: {0}")]
    StreamPlayError(String),

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    /// The mixer could not be created for the negotiated stream
    #[error("Could not create mixer: {0}")]
    Engine(#[from] MixerError),
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;
