//! Engine error types
//!
//! - [`FormatError`]: encoded data rejected at source creation
//! - [`DecodeError`]: codec failure while a source is playing (stops that source)
//! - [`MixerError`]: errors reported to the control context

use thiserror::Error;

use crate::types::SourceId;

/// Encoded data could not be turned into a decoder
#[derive(Error, Debug)]
pub enum FormatError {
    /// Neither a RIFF/WAVE nor an Ogg signature was found
    #[error("Unrecognized audio data (expected RIFF/WAVE or Ogg)")]
    Unrecognized,

    #[error("Expected 16-bit wave data, found {0}-bit")]
    UnsupportedBitDepth(u16),

    #[error("Expected integer PCM samples, found floating point")]
    UnsupportedSampleFormat,

    #[error("Expected mono or stereo audio, found {0} channels")]
    UnsupportedChannels(usize),

    #[error("Audio data contains no samples")]
    Empty,

    #[error("Could not read wave data: {0}")]
    Wav(#[from] hound::Error),

    #[error("Could not open compressed stream: {0}")]
    Stream(String),
}

/// Codec failure during playback
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Codec error: {0}")]
    Codec(String),

    /// A packet decoded to more frames than the preallocated buffer holds
    #[error("Packet of {frames} frames exceeds the {capacity}-frame decode buffer")]
    PacketTooLarge { frames: usize, capacity: usize },

    #[error("Could not rewind stream: {0}")]
    Seek(String),

    /// The stream produced no frames even after rewinding
    #[error("Stream produced no samples after rewinding")]
    EmptyStream,

    #[error("Decoder has been closed")]
    Closed,
}

/// Errors returned by the control API
#[derive(Error, Debug)]
pub enum MixerError {
    #[error(transparent)]
    Format(#[from] FormatError),

    /// All source slots are in use
    #[error("Source limit reached ({max} sources)")]
    TooManySources { max: usize },

    #[error("The master bus cannot be {0}")]
    MasterBus(&'static str),

    #[error("Stale source handle: {0}")]
    StaleHandle(SourceId),

    #[error("Routing {from} into {to} would create a cycle")]
    RoutingCycle { from: SourceId, to: SourceId },

    #[error("Invalid engine config: {0}")]
    InvalidConfig(String),
}

/// Result type for control API operations
pub type MixerResult<T> = Result<T, MixerError>;
