//! # Ethcon Core Library
//!
//! A remote line-oriented console over TCP:
//! - Two bounded byte channels between the network and the console
//! - A line discipline character device translating newline conventions
//! - An echo listener and a console listener, one connection at a time
//!
//! ## Example
//!
//! ```rust,no_run
//! use ethcon_core::{AppConfig, ConsoleService, DeviceStream, OpenFlags};
//! use std::io::Write;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let service = ConsoleService::new(&AppConfig::default())?;
//!     let _endpoints = service.start();
//!
//!     let mut console = DeviceStream::open(Arc::clone(service.device()), OpenFlags::blocking());
//!     writeln!(console, "hello from the device")?;
//!     console.flush()?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;
pub mod logging;

// Re-exports for convenience
pub use crate::cli::{CliResult, ExitCodes};
pub use crate::config::{AppConfig, ConfigError, LineEndingConfig, LoggingConfig};
pub use crate::core::channel::{ByteChannel, ChannelError, Chunk, Wait};
pub use crate::core::codec::LineEnding;
pub use crate::core::device::{
    CharDevice, DeviceError, DeviceLogWriter, DeviceStream, Handle, LineDisciplineDevice,
    LineEndings, OpenFlags,
};
pub use crate::core::server::{ConnectionLoop, KeepaliveConfig, Role, RoleKind};
pub use crate::core::service::{ConsoleService, Endpoint, RunningEndpoint, ServiceError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
