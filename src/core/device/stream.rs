//! `std::io` adapters over a character device

use super::{CharDevice, DeviceError, Handle, LineDisciplineDevice, OpenFlags};
use std::io::{self, Read, Write};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;

impl From<DeviceError> for io::Error {
    fn from(err: DeviceError) -> Self {
        let kind = match err {
            DeviceError::WouldBlock => io::ErrorKind::WouldBlock,
            DeviceError::BadHandle(_) | DeviceError::PathTooLong { .. } => io::ErrorKind::InvalidInput,
            DeviceError::NotRegistered | DeviceError::PathMismatch { .. } => io::ErrorKind::NotFound,
            DeviceError::AlreadyRegistered(_) => io::ErrorKind::AlreadyExists,
        };
        io::Error::new(kind, err)
    }
}

/// Open handle on a character device, usable as a byte stream
///
/// The handle is closed on drop.
pub struct DeviceStream<D: CharDevice = LineDisciplineDevice> {
    device: Arc<D>,
    handle: Handle,
}

impl<D: CharDevice> DeviceStream<D> {
    /// Open `device` with `flags`
    pub fn open(device: Arc<D>, flags: OpenFlags) -> Self {
        let handle = device.open(flags);
        Self { device, handle }
    }

    /// Underlying handle
    pub fn handle(&self) -> Handle {
        self.handle
    }
}

impl<D: CharDevice> Read for DeviceStream<D> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.device.read(self.handle, buf)?)
    }
}

impl<D: CharDevice> Write for DeviceStream<D> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let accepted = self.device.write(self.handle, buf)?;
        if accepted == 0 && !buf.is_empty() {
            let kind = if self.device.get_flags(self.handle)?.nonblocking {
                io::ErrorKind::WouldBlock
            } else {
                io::ErrorKind::WriteZero
            };
            return Err(kind.into());
        }
        Ok(accepted)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(self.device.fsync(self.handle)?)
    }
}

impl<D: CharDevice> Drop for DeviceStream<D> {
    fn drop(&mut self) {
        let _ = self.device.close(self.handle);
    }
}

/// Log sink that mirrors formatted log lines to the remote console
///
/// Writes never wait: text that does not fit in the outbound channel is
/// dropped so logging can never stall on a slow or absent client.
#[derive(Debug, Clone)]
pub struct DeviceLogWriter {
    device: Arc<LineDisciplineDevice>,
}

impl DeviceLogWriter {
    /// Mirror into `device`
    pub fn new(device: Arc<LineDisciplineDevice>) -> Self {
        Self { device }
    }
}

impl Write for DeviceLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.device.try_write(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for DeviceLogWriter {
    type Writer = DeviceLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
