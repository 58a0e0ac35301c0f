//! Core module containing the remote console
//!
//! This module provides:
//! - Bounded byte channels between the network and the console device
//! - Line discipline device with newline translation
//! - TCP listeners (echo and console roles)
//! - Service wiring of channels, device and listeners
//! - Byte escaping and line ending definitions

pub mod channel;
pub mod codec;
pub mod device;
pub mod server;
pub mod service;
