//! CLI Exit Codes
//!
//! Exit codes reported by the `ethcon` binary.

use crate::config::ConfigError;
use crate::core::service::ServiceError;
use std::process::ExitCode;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Success
    pub const SUCCESS: u8 = 0;

    /// General error
    pub const ERROR: u8 = 1;

    /// Invalid arguments; raised by the clap parser, which exits with
    /// this status on a usage error
    pub const INVALID_ARGS: u8 = 2;

    /// No listener could be started
    pub const LISTEN_FAILED: u8 = 3;

    /// File not found
    pub const FILE_NOT_FOUND: u8 = 6;

    /// Permission denied
    pub const PERMISSION_DENIED: u8 = 7;

    /// Configuration error
    pub const CONFIG_ERROR: u8 = 8;

    /// Console device could not be registered
    pub const DEVICE_BUSY: u8 = 13;

    /// Internal error
    pub const INTERNAL_ERROR: u8 = 127;
}

/// CLI operation result
#[derive(Debug)]
pub enum CliResult {
    /// Success with optional message
    Success(Option<String>),

    /// Error with code and message
    Error(u8, String),
}

impl CliResult {
    /// Plain success
    pub fn success() -> Self {
        Self::Success(None)
    }

    /// Failure with `code`
    pub fn error(code: u8, msg: impl Into<String>) -> Self {
        Self::Error(code, msg.into())
    }

    /// No listener came up
    pub fn listen_failed(msg: impl Into<String>) -> Self {
        Self::Error(ExitCodes::LISTEN_FAILED, msg.into())
    }

    /// Get exit code
    pub fn code(&self) -> u8 {
        match self {
            Self::Success(_) => ExitCodes::SUCCESS,
            Self::Error(code, _) => *code,
        }
    }

    /// Get message
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success(Some(msg)) | Self::Error(_, msg) => Some(msg),
            Self::Success(None) => None,
        }
    }

    /// Convert to ExitCode
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// Is success?
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<std::io::Error> for CliResult {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let code = match err.kind() {
            ErrorKind::NotFound => ExitCodes::FILE_NOT_FOUND,
            ErrorKind::PermissionDenied => ExitCodes::PERMISSION_DENIED,
            _ => ExitCodes::ERROR,
        };

        Self::Error(code, err.to_string())
    }
}

impl From<ConfigError> for CliResult {
    fn from(err: ConfigError) -> Self {
        match &err {
            ConfigError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                Self::Error(ExitCodes::FILE_NOT_FOUND, err.to_string())
            }
            _ => Self::Error(ExitCodes::CONFIG_ERROR, err.to_string()),
        }
    }
}

impl From<ServiceError> for CliResult {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Config(inner) => inner.into(),
            ServiceError::Device(_) => Self::Error(ExitCodes::DEVICE_BUSY, err.to_string()),
            ServiceError::Channel(_) => Self::Error(ExitCodes::INTERNAL_ERROR, err.to_string()),
        }
    }
}

/// Exit code description
pub fn exit_code_description(code: u8) -> &'static str {
    match code {
        0 => "Success",
        1 => "General error",
        2 => "Invalid arguments",
        3 => "No listener could be started",
        6 => "File not found",
        7 => "Permission denied",
        8 => "Configuration error",
        13 => "Console device busy",
        127 => "Internal error",
        _ => "Unknown error",
    }
}

/// Print exit code table
pub fn print_exit_codes() {
    println!("Exit Codes:");
    for code in [0, 1, 2, 3, 6, 7, 8, 13, 127] {
        println!("  {:>3}  {}", code, exit_code_description(code));
    }
}
