//! Default locations for config files

use std::path::PathBuf;

/// Platform config directory for busmix
///
/// `~/.config/busmix` on Linux, the equivalent elsewhere, or `./busmix` when
/// the platform reports no config directory.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("busmix")
}

/// Path of a named config file in [`default_config_dir`]
pub fn default_config_path(filename: &str) -> PathBuf {
    default_config_dir().join(filename)
}
