//! Service settings

use crate::core::channel::DEFAULT_CAPACITY;
use crate::core::codec::LineEnding;
use crate::core::device::{DEFAULT_PATH, MAX_PATH_LEN};
use crate::core::server::{KeepaliveConfig, DEFAULT_SCRATCH_SIZE};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File could not be read or written
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// File is not valid TOML for this schema
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Settings could not be serialized
    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// No platform configuration directory
    #[error("Could not determine config directory")]
    NoConfigDir,

    /// Settings are inconsistent
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Address both listeners bind to
    pub bind_address: IpAddr,
    /// Echo listener port
    pub echo_port: u16,
    /// Console listener port
    pub console_port: u16,
    /// Capacity of each console channel, in bytes
    pub channel_capacity: usize,
    /// Per-connection scratch buffer, in bytes
    pub scratch_size: usize,
    /// Device registration path
    pub device_path: String,
    /// Default newline conventions
    pub line_endings: LineEndingConfig,
    /// Keepalive probing
    pub keepalive: KeepaliveConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            echo_port: 3333,
            console_port: 2323,
            channel_capacity: DEFAULT_CAPACITY,
            scratch_size: DEFAULT_SCRATCH_SIZE,
            device_path: DEFAULT_PATH.to_string(),
            line_endings: LineEndingConfig::default(),
            keepalive: KeepaliveConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load config from the default location, or defaults if absent
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = super::default_config_path().ok_or(ConfigError::NoConfigDir)?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Save config to a file
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check the settings for consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        // A translated CRLF newline is enqueued as one span
        if self.channel_capacity < 2 {
            return Err(ConfigError::Invalid(format!(
                "channel_capacity must be at least 2 bytes (got {})",
                self.channel_capacity
            )));
        }
        if self.scratch_size == 0 {
            return Err(ConfigError::Invalid("scratch_size must be non-zero".to_string()));
        }
        if self.echo_port != 0 && self.echo_port == self.console_port {
            return Err(ConfigError::Invalid(format!(
                "echo_port and console_port are both {}",
                self.echo_port
            )));
        }
        if self.device_path.len() > MAX_PATH_LEN {
            return Err(ConfigError::Invalid(format!(
                "device_path '{}' is longer than {} bytes",
                self.device_path, MAX_PATH_LEN
            )));
        }
        Ok(())
    }
}

/// Default newline conventions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineEndingConfig {
    /// Convention expected from clients
    pub rx: LineEnding,
    /// Convention sent to clients
    pub tx: LineEnding,
}

impl Default for LineEndingConfig {
    fn default() -> Self {
        Self {
            rx: LineEnding::Cr,
            tx: LineEnding::CrLf,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` takes precedence)
    pub level: String,
    /// Emit JSON lines on stderr
    pub json: bool,
    /// Copy log lines to the remote console
    pub mirror_to_console: bool,
    /// Also write daily-rotated log files here (`--log-dir`)
    pub directory: Option<PathBuf>,
}

impl LoggingConfig {
    /// Write rotated log files to `dir`, or to [`super::log_dir`] when `None`
    pub fn enable_file_output(&mut self, dir: Option<PathBuf>) -> Result<(), ConfigError> {
        let dir = match dir {
            Some(dir) => dir,
            None => super::log_dir().ok_or(ConfigError::NoConfigDir)?,
        };
        self.directory = Some(dir);
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            mirror_to_console: false,
            directory: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.channel_capacity, 1024);
        assert_eq!(config.line_endings.rx, LineEnding::Cr);
        assert_eq!(config.line_endings.tx, LineEnding::CrLf);
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            console_port = 2300

            [line_endings]
            rx = "CrLf"
            "#,
        )
        .unwrap();

        assert_eq!(config.console_port, 2300);
        assert_eq!(config.echo_port, 3333);
        assert_eq!(config.line_endings.rx, LineEnding::CrLf);
        assert_eq!(config.line_endings.tx, LineEnding::CrLf);
        assert_eq!(config.keepalive, KeepaliveConfig::default());
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = AppConfig::default();
        config.echo_port = 7000;
        config.logging.mirror_to_console = true;
        config.save_to(&path).unwrap();

        assert_eq!(AppConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        match AppConfig::load_from(&path) {
            Err(ConfigError::Io { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected I/O error, got {other:?}"),
        }
    }

    #[test]
    fn test_file_output_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut logging = LoggingConfig::default();
        logging.enable_file_output(Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(logging.directory.as_deref(), Some(dir.path()));

        let mut logging = LoggingConfig::default();
        match crate::config::log_dir() {
            Some(default) => {
                logging.enable_file_output(None).unwrap();
                assert_eq!(logging.directory, Some(default));
            }
            None => assert!(matches!(
                logging.enable_file_output(None),
                Err(ConfigError::NoConfigDir)
            )),
        }
    }

    #[test]
    fn test_validate_rejects_inconsistent_settings() {
        let mut config = AppConfig::default();
        config.channel_capacity = 1;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.console_port = config.echo_port;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.device_path = "/dev/much-too-long-path".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.echo_port = 0;
        config.console_port = 0;
        assert!(config.validate().is_ok());
    }
}
