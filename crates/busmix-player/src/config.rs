//! Player configuration
//!
//! Stored as YAML in the platform config directory
//! (`~/.config/busmix/player.yaml` on Linux). Every field is optional.

use busmix_core::audio::AudioConfig;
use busmix_core::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const CONFIG_FILENAME: &str = "player.yaml";

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Output device and stream preferences
    pub audio: AudioConfig,
    /// Mixer limits
    pub engine: EngineConfig,
    /// Gain applied to every file unless overridden on the command line
    pub default_gain: f64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            engine: EngineConfig::default(),
            default_gain: 1.0,
        }
    }
}

pub fn default_config_path() -> PathBuf {
    busmix_core::config::default_config_path(CONFIG_FILENAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PlayerConfig::default();
        assert_eq!(config.default_gain, 1.0);
        assert_eq!(config.engine.sample_rate, 44100);
        assert!(config.audio.device.is_none());
    }

    #[test]
    fn test_partial_yaml() {
        let config: PlayerConfig = parse("default_gain: 0.5\n");
        assert_eq!(config.default_gain, 0.5);
        assert_eq!(config.engine.max_sources, EngineConfig::default().max_sources);
    }

    #[test]
    fn test_config_path_filename() {
        assert!(default_config_path().ends_with("busmix/player.yaml"));
    }

    fn parse(yaml: &str) -> PlayerConfig {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(&path, yaml).unwrap();
        busmix_core::config::read_config(&path).unwrap()
    }
}
