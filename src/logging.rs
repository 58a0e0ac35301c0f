//! Tracing subscriber setup
//!
//! Layers, outermost first:
//! - stderr, plain or JSON
//! - optional daily-rotated file under the configured directory
//! - optional mirror into the remote console device
//!
//! `RUST_LOG` overrides the configured filter when set.

use crate::config::LoggingConfig;
use crate::core::device::DeviceLogWriter;
use crate::core::server::RELAY_TARGET;
use std::io;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::{filter_fn, EnvFilter, ParseError};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, Layer};

/// File name prefix for rotated log files
const LOG_FILE_PREFIX: &str = "ethcon.log";

/// Logging setup error types
#[derive(Error, Debug)]
pub enum LoggingError {
    /// Bad filter directive
    #[error("Invalid log filter: {0}")]
    Filter(#[from] ParseError),

    /// Log directory could not be created
    #[error("Unable to create log directory: {0}")]
    Io(#[from] io::Error),

    /// A global subscriber is already installed
    #[error("Logging already initialized: {0}")]
    Init(#[from] TryInitError),
}

/// Keeps the file writer flushing; hold it until exit
#[derive(Debug)]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber
///
/// When `mirror` is given, every event except relay traffic is also
/// written to the console device.
pub fn init(config: &LoggingConfig, mirror: Option<DeviceLogWriter>) -> Result<LogGuard, LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)?,
    };

    let stderr = if config.json {
        fmt::layer().json().with_writer(io::stderr).boxed()
    } else {
        fmt::layer().with_writer(io::stderr).boxed()
    };

    let (file, guard) = match &config.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let mirror = mirror.map(|writer| {
        fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .without_time()
            .with_writer(writer)
            .with_filter(filter_fn(|meta| meta.target() != RELAY_TARGET))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file)
        .with(mirror)
        .try_init()?;

    Ok(LogGuard { _file: guard })
}
