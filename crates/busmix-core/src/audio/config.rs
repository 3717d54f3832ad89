//! Audio output configuration
//!
//! Device selection, buffer size and sample rate preferences for the cpal
//! output stream.

use serde::{Deserialize, Serialize};

/// Largest buffer size accepted for a fixed request (frames)
pub const MAX_BUFFER_SIZE: usize = 8192;

/// Smallest buffer size accepted for a fixed request (frames)
pub const MIN_BUFFER_SIZE: u32 = 64;

/// Buffer size used when no preference is given (frames)
/// 512 frames @ 44.1kHz = ~11.6ms
pub const DEFAULT_BUFFER_SIZE: u32 = 512;

/// Sample rate requested when no preference is given
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Preferred buffer size for the output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BufferSize {
    /// Use [`DEFAULT_BUFFER_SIZE`]
    #[default]
    Default,
    /// Request a specific size in frames (clamped to a sane range)
    Fixed(u32),
}

impl BufferSize {
    /// Frames to request from the device
    pub fn frames(&self) -> u32 {
        match self {
            BufferSize::Default => DEFAULT_BUFFER_SIZE,
            BufferSize::Fixed(frames) => (*frames).clamp(MIN_BUFFER_SIZE, MAX_BUFFER_SIZE as u32),
        }
    }

    /// One-way output latency in milliseconds at `sample_rate`
    pub fn latency_ms(&self, sample_rate: u32) -> f32 {
        (self.frames() as f32 / sample_rate as f32) * 1000.0
    }
}

/// Audio device identifier
///
/// The host (ALSA, JACK, CoreAudio, ...) is optional; without it every host
/// is searched by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    /// Device name as reported by the system
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }

    pub fn with_host(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: Some(host.to_string()),
        }
    }

    /// Display label including the host when known
    pub fn display_label(&self) -> String {
        match &self.host {
            Some(host) => format!("[{}] {}", host, self.name),
            None => self.name.clone(),
        }
    }
}

/// Configuration for the output stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device (None = system default)
    pub device: Option<DeviceId>,

    pub buffer_size: BufferSize,

    /// Preferred sample rate (None = [`DEFAULT_SAMPLE_RATE`] if the device supports it)
    pub sample_rate: Option<u32>,
}

impl AudioConfig {
    pub fn with_device(mut self, device: DeviceId) -> Self {
        self.device = Some(device);
        self
    }

    pub fn with_buffer_frames(mut self, frames: u32) -> Self {
        self.buffer_size = BufferSize::Fixed(frames);
        self
    }

    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = Some(rate);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_size_frames() {
        assert_eq!(BufferSize::Default.frames(), DEFAULT_BUFFER_SIZE);
        assert_eq!(BufferSize::Fixed(256).frames(), 256);
        assert_eq!(BufferSize::Fixed(1).frames(), MIN_BUFFER_SIZE);
        assert_eq!(BufferSize::Fixed(1 << 20).frames(), MAX_BUFFER_SIZE as u32);
    }

    #[test]
    fn test_latency() {
        let latency = BufferSize::Fixed(480).latency_ms(48000);
        assert!((latency - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_device_label() {
        assert_eq!(DeviceId::new("hw:0,0").display_label(), "hw:0,0");
        assert_eq!(DeviceId::with_host("hw:0,0", "ALSA").display_label(), "[ALSA] hw:0,0");
    }

    #[test]
    fn test_config_yaml() {
        let config = AudioConfig::default()
            .with_device(DeviceId::with_host("Speakers", "CoreAudio"))
            .with_buffer_frames(256)
            .with_sample_rate(48000);

        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: AudioConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, config);

        // Missing fields fall back to defaults
        let parsed: AudioConfig = serde_yaml::from_str("sample_rate: 22050\n").unwrap();
        assert_eq!(parsed.buffer_size, BufferSize::Default);
        assert_eq!(parsed.device, None);
    }
}
