//! Configuration files
//!
//! YAML load/save helpers usable with any serde config type, and the
//! default location of busmix config files.
//!
//! ```ignore
//! use busmix_core::config::{default_config_path, load_config, save_config};
//!
//! let path = default_config_path("player.yaml");
//! let config: PlayerConfig = load_config(&path);
//! save_config(&config, &path)?;
//! ```

mod io;
mod paths;

pub use io::{load_config, read_config, save_config};
pub use paths::{default_config_dir, default_config_path};
