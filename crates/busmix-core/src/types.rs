//! Common types for Busmix
//!
//! Handles, playback state and the buffer geometry shared by the decoder
//! adapters and the render pipeline.

use std::fmt;

/// Frames held by each source's raw decode ring (power of two)
pub const RING_FRAMES: usize = 8192;

/// Mask applied to frame indices to find their ring slot
pub const RING_MASK: usize = RING_FRAMES - 1;

/// Frames decoded per ring refill
pub const DECODE_CHUNK_FRAMES: usize = RING_FRAMES / 2;

/// Stable handle to a source living in the engine's arena
///
/// The index names an arena slot; the generation is bumped every time the
/// slot is freed, so a handle kept past destruction never aliases a newer
/// source that reuses the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId {
    index: u32,
    generation: u32,
}

impl SourceId {
    /// The master bus: always slot 0, never recycled
    pub const MASTER: SourceId = SourceId { index: 0, generation: 0 };

    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Arena slot index
    #[inline]
    pub fn index(&self) -> usize {
        self.index as usize
    }

    /// Slot generation this handle was issued for
    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    #[inline]
    pub fn is_master(&self) -> bool {
        *self == Self::MASTER
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_master() {
            write!(f, "master")
        } else {
            write!(f, "source#{}.{}", self.index, self.generation)
        }
    }
}

/// Playback state of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum PlaybackState {
    #[default]
    Stopped = 0,
    Playing = 1,
    Paused = 2,
}

impl PlaybackState {
    /// Decode the value stored in a source's state atomic
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => PlaybackState::Playing,
            2 => PlaybackState::Paused,
            _ => PlaybackState::Stopped,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_geometry() {
        assert!(RING_FRAMES.is_power_of_two());
        assert_eq!(DECODE_CHUNK_FRAMES * 2, RING_FRAMES);
        assert_eq!((RING_FRAMES + 5) & RING_MASK, 5);
    }

    #[test]
    fn test_playback_state_roundtrip() {
        for state in [PlaybackState::Stopped, PlaybackState::Playing, PlaybackState::Paused] {
            assert_eq!(PlaybackState::from_u8(state as u8), state);
        }
        assert_eq!(PlaybackState::from_u8(200), PlaybackState::Stopped);
        assert_eq!(PlaybackState::Paused.to_string(), "paused");
    }

    #[test]
    fn test_master_id() {
        assert!(SourceId::MASTER.is_master());
        assert!(!SourceId::new(0, 1).is_master());
        assert_eq!(SourceId::new(3, 7).to_string(), "source#3.7");
    }
}
