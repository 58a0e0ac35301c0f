//! Configuration module
//!
//! Handles service settings: ports, line endings, channel sizing,
//! keepalive and logging.

mod settings;

pub use settings::{AppConfig, ConfigError, LineEndingConfig, LoggingConfig};

use directories::ProjectDirs;
use std::path::PathBuf;

/// Get the application configuration directory
pub fn config_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "ethcon", "Ethcon").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Default log file directory, used by `--log-dir` without a value
pub fn log_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "ethcon", "Ethcon").map(|dirs| dirs.data_dir().join("logs"))
}

/// Default configuration file path
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}
