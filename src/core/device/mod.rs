//! Line discipline character device
//!
//! The device sits between a local line editor and the two byte channels
//! of a remote console. Writes translate logical newlines into the wire
//! convention; reads decode the wire convention back into logical
//! newlines, holding a trailing carriage return until the byte after it
//! shows up.
//!
//! There is exactly one device per console. `open` hands out the same
//! handle every time; flags set through it apply to the whole device.

mod stream;

pub use stream::{DeviceLogWriter, DeviceStream};

use crate::core::channel::{ByteChannel, Wait};
use crate::core::codec::{LineEnding, CR, LF};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Path the device registers under when none is given
pub const DEFAULT_PATH: &str = "/dev/ethcon0";

/// Longest accepted registration path, in bytes
pub const MAX_PATH_LEN: usize = 15;

/// How long a blocking read sleeps on an empty channel before re-checking
pub const READ_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Delay between outbound occupancy checks while flushing
pub const FLUSH_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Largest span a single write enqueues
const MAX_SPAN: usize = 128;

/// Device error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// Non-blocking read with no decodable input
    #[error("Operation would block")]
    WouldBlock,

    /// Handle not issued by this device
    #[error("Bad handle: {0:?}")]
    BadHandle(Handle),

    /// Register called twice
    #[error("Device already registered at '{0}'")]
    AlreadyRegistered(String),

    /// Unregister called on an unregistered device
    #[error("Device not registered")]
    NotRegistered,

    /// Registration path too long
    #[error("Path is {len} bytes long; maximum is {max}")]
    PathTooLong {
        /// Given length
        len: usize,
        /// Maximum length
        max: usize,
    },

    /// Unregister called with a path the device is not registered under
    #[error("No device registered at '{requested}' (registered at '{registered}')")]
    PathMismatch {
        /// Path the caller asked for
        requested: String,
        /// Path the device holds
        registered: String,
    },
}

/// Device handle as returned by `open`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u32);

impl Handle {
    /// The only handle the device issues
    pub const DEVICE: Handle = Handle(0);

    /// Build a handle from a raw descriptor number
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw descriptor number
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Open/fcntl flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenFlags {
    /// Reads fail with `WouldBlock` and writes stop short instead of waiting
    pub nonblocking: bool,
}

impl OpenFlags {
    /// Blocking flags
    pub fn blocking() -> Self {
        Self { nonblocking: false }
    }

    /// Non-blocking flags
    pub fn nonblocking() -> Self {
        Self { nonblocking: true }
    }
}

/// Kind of device node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// Character stream
    Character,
}

/// Result of `stat`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStat {
    /// Node kind
    pub kind: DeviceKind,
}

/// Newline conventions applied by a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LineEndings {
    /// Convention expected from the wire
    pub rx: LineEnding,
    /// Convention sent to the wire
    pub tx: LineEnding,
}

/// Character device operations, as seen by a file-like dispatcher
#[cfg_attr(test, mockall::automock)]
pub trait CharDevice: Send + Sync {
    /// Open the device, applying `flags`
    fn open(&self, flags: OpenFlags) -> Handle;

    /// Close a handle
    fn close(&self, handle: Handle) -> Result<(), DeviceError>;

    /// Read decoded bytes
    fn read(&self, handle: Handle, buf: &mut [u8]) -> Result<usize, DeviceError>;

    /// Write bytes, returning how many source bytes were accepted
    fn write(&self, handle: Handle, data: &[u8]) -> Result<usize, DeviceError>;

    /// Wait until everything written is on the wire
    fn fsync(&self, handle: Handle) -> Result<(), DeviceError>;

    /// Current flags
    fn get_flags(&self, handle: Handle) -> Result<OpenFlags, DeviceError>;

    /// Replace flags
    fn set_flags(&self, handle: Handle, flags: OpenFlags) -> Result<(), DeviceError>;

    /// Node information
    fn stat(&self, handle: Handle) -> Result<DeviceStat, DeviceError>;
}

#[derive(Debug)]
struct ReadState {
    rx_mode: LineEnding,
    pushback: Option<u8>,
}

impl ReadState {
    fn new(rx_mode: LineEnding) -> Self {
        Self {
            rx_mode,
            pushback: None,
        }
    }

    fn next_byte(&mut self, inbound: &ByteChannel) -> Option<u8> {
        self.pushback.take().or_else(|| {
            inbound
                .receive_upto(1, Wait::Poll)
                .and_then(|chunk| chunk.first().copied())
        })
    }

    fn push_back(&mut self, byte: u8) {
        assert!(
            self.pushback.is_none(),
            "pushback slot already holds a byte"
        );
        self.pushback = Some(byte);
    }
}

#[derive(Debug)]
struct WriteState {
    tx_mode: LineEnding,
}

/// Newline-translating character device over an inbound and an outbound
/// channel
#[derive(Debug)]
pub struct LineDisciplineDevice {
    inbound: ByteChannel,
    outbound: ByteChannel,
    defaults: LineEndings,
    reader: Mutex<ReadState>,
    writer: Mutex<WriteState>,
    nonblocking: AtomicBool,
    path: RwLock<Option<String>>,
}

impl LineDisciplineDevice {
    /// Create an unregistered device
    ///
    /// `inbound` carries bytes from the wire, `outbound` bytes to the wire.
    pub fn new(inbound: ByteChannel, outbound: ByteChannel, defaults: LineEndings) -> Self {
        Self {
            inbound,
            outbound,
            defaults,
            reader: Mutex::new(ReadState::new(defaults.rx)),
            writer: Mutex::new(WriteState {
                tx_mode: defaults.tx,
            }),
            nonblocking: AtomicBool::new(false),
            path: RwLock::new(None),
        }
    }

    /// Attach the device under `path` ([`DEFAULT_PATH`] if `None`)
    pub fn register(&self, path: Option<&str>) -> Result<(), DeviceError> {
        let path = path.unwrap_or(DEFAULT_PATH);
        if path.len() > MAX_PATH_LEN {
            return Err(DeviceError::PathTooLong {
                len: path.len(),
                max: MAX_PATH_LEN,
            });
        }

        let mut registered = self.path.write();
        if let Some(existing) = registered.as_ref() {
            return Err(DeviceError::AlreadyRegistered(existing.clone()));
        }
        self.reset();
        *registered = Some(path.to_string());
        drop(registered);

        debug!(path, "Line discipline device registered");
        Ok(())
    }

    /// Detach the device and reset its state
    pub fn unregister(&self, path: Option<&str>) -> Result<(), DeviceError> {
        let path = path.unwrap_or(DEFAULT_PATH);
        let mut registered = self.path.write();
        match registered.as_deref() {
            None => return Err(DeviceError::NotRegistered),
            Some(current) if current != path => {
                return Err(DeviceError::PathMismatch {
                    requested: path.to_string(),
                    registered: current.to_string(),
                })
            }
            Some(_) => {}
        }
        *registered = None;
        self.reset();
        drop(registered);

        debug!(path, "Line discipline device unregistered");
        Ok(())
    }

    /// Is the device registered
    pub fn is_registered(&self) -> bool {
        self.path.read().is_some()
    }

    /// Registration path
    pub fn path(&self) -> Option<String> {
        self.path.read().clone()
    }

    fn reset(&self) {
        *self.reader.lock() = ReadState::new(self.defaults.rx);
        self.writer.lock().tx_mode = self.defaults.tx;
        self.nonblocking.store(false, Ordering::Release);
    }

    fn assert_registered(&self) {
        assert!(
            self.is_registered(),
            "line discipline device used while unregistered"
        );
    }

    fn check(&self, handle: Handle) -> Result<(), DeviceError> {
        self.assert_registered();
        if handle == Handle::DEVICE {
            Ok(())
        } else {
            Err(DeviceError::BadHandle(handle))
        }
    }

    fn is_nonblocking(&self) -> bool {
        self.nonblocking.load(Ordering::Acquire)
    }

    /// Open the device; `flags` replace the device-wide flags
    pub fn open(&self, flags: OpenFlags) -> Handle {
        self.assert_registered();
        self.nonblocking.store(flags.nonblocking, Ordering::Release);
        Handle::DEVICE
    }

    /// Close a handle
    pub fn close(&self, handle: Handle) -> Result<(), DeviceError> {
        self.check(handle)
    }

    /// Current flags
    pub fn flags(&self, handle: Handle) -> Result<OpenFlags, DeviceError> {
        self.check(handle)?;
        Ok(OpenFlags {
            nonblocking: self.is_nonblocking(),
        })
    }

    /// Replace flags
    pub fn set_flags(&self, handle: Handle, flags: OpenFlags) -> Result<(), DeviceError> {
        self.check(handle)?;
        self.nonblocking.store(flags.nonblocking, Ordering::Release);
        Ok(())
    }

    /// Node information
    pub fn stat(&self, handle: Handle) -> Result<DeviceStat, DeviceError> {
        self.check(handle)?;
        Ok(DeviceStat {
            kind: DeviceKind::Character,
        })
    }

    /// Receive-side convention
    pub fn rx_mode(&self) -> LineEnding {
        self.reader.lock().rx_mode
    }

    /// Transmit-side convention
    pub fn tx_mode(&self) -> LineEnding {
        self.writer.lock().tx_mode
    }

    /// Set the convention expected from the wire
    pub fn set_rx_mode(&self, mode: LineEnding) {
        self.assert_registered();
        self.reader.lock().rx_mode = mode;
    }

    /// Set the convention sent to the wire
    pub fn set_tx_mode(&self, mode: LineEnding) {
        self.assert_registered();
        self.writer.lock().tx_mode = mode;
    }

    /// Write `data`, translating newlines
    ///
    /// Returns the number of source bytes accepted. In non-blocking mode
    /// this stops short as soon as the outbound channel is full.
    pub fn write(&self, handle: Handle, data: &[u8]) -> Result<usize, DeviceError> {
        self.check(handle)?;
        let wait = if self.is_nonblocking() {
            Wait::Poll
        } else {
            Wait::Forever
        };
        let writer = self.writer.lock();
        Ok(self.encode(&writer, data, wait))
    }

    /// Write without waiting, whatever the device flags
    ///
    /// Gives up immediately if another writer holds the device.
    pub fn try_write(&self, data: &[u8]) -> usize {
        if !self.is_registered() {
            return 0;
        }
        match self.writer.try_lock() {
            Some(writer) => self.encode(&writer, data, Wait::Poll),
            None => 0,
        }
    }

    // No tracing in here: the log mirror writes through this path.
    fn encode(&self, writer: &WriteState, data: &[u8], wait: Wait) -> usize {
        let span_limit = self.outbound.capacity().min(MAX_SPAN);
        let mut accepted = 0;

        while accepted < data.len() {
            let rest = &data[accepted..];
            let (span, consumed) = if rest[0] == LF {
                (writer.tx_mode.bytes(), 1)
            } else {
                let run = rest.iter().position(|&b| b == LF).unwrap_or(rest.len());
                let mut len = run.min(span_limit);
                if wait == Wait::Poll {
                    len = len.min(self.outbound.free_bytes().max(1));
                }
                (&rest[..len], len)
            };

            if self.outbound.send(span, wait).is_err() {
                break;
            }
            accepted += consumed;
        }

        accepted
    }

    /// Read decoded bytes into `buf`
    ///
    /// Blocking mode waits until at least one byte can be produced;
    /// non-blocking mode fails with [`DeviceError::WouldBlock`] instead.
    pub fn read(&self, handle: Handle, buf: &mut [u8]) -> Result<usize, DeviceError> {
        self.check(handle)?;
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            let produced = self.decode_available(buf);
            if produced > 0 {
                return Ok(produced);
            }
            if self.is_nonblocking() {
                return Err(DeviceError::WouldBlock);
            }
            self.inbound.wait_available(READ_POLL_INTERVAL);
        }
    }

    /// Decode from what is available now, never waiting for more input
    fn decode_available(&self, buf: &mut [u8]) -> usize {
        let mut reader = self.reader.lock();

        // CRLF collapses two inputs into one output, so the input count
        // bounds the output.
        let mut budget = self.inbound.available_bytes() + usize::from(reader.pushback.is_some());
        let mut produced = 0;

        while produced < buf.len() && budget > 0 {
            let Some(byte) = reader.next_byte(&self.inbound) else {
                break;
            };
            budget -= 1;

            let decoded = match (byte, reader.rx_mode) {
                (CR, LineEnding::Cr) => LF,
                (CR, LineEnding::CrLf) => match reader.next_byte(&self.inbound) {
                    None => {
                        // Undecided until the next byte arrives
                        reader.push_back(CR);
                        break;
                    }
                    Some(LF) => {
                        budget = budget.saturating_sub(1);
                        LF
                    }
                    Some(other) => {
                        reader.push_back(other);
                        CR
                    }
                },
                (byte, _) => byte,
            };

            buf[produced] = decoded;
            produced += 1;
        }

        produced
    }

    /// Wait until every byte written so far has left the outbound channel
    pub fn flush(&self, handle: Handle) -> Result<(), DeviceError> {
        self.check(handle)?;
        let _writer = self.writer.lock();
        while self.outbound.pending_bytes() > 0 {
            thread::sleep(FLUSH_POLL_INTERVAL);
        }
        Ok(())
    }

    /// Drop all queued input without decoding it
    ///
    /// Returns the number of bytes discarded, including a held byte.
    pub fn discard_pending_input(&self) -> usize {
        self.assert_registered();
        let mut reader = self.reader.lock();
        let mut discarded = usize::from(reader.pushback.take().is_some());
        while let Some(chunk) = self.inbound.receive(Wait::Poll) {
            discarded += chunk.len();
        }
        drop(reader);

        debug!(discarded, "Discarded pending console input");
        discarded
    }
}

impl CharDevice for LineDisciplineDevice {
    fn open(&self, flags: OpenFlags) -> Handle {
        LineDisciplineDevice::open(self, flags)
    }

    fn close(&self, handle: Handle) -> Result<(), DeviceError> {
        LineDisciplineDevice::close(self, handle)
    }

    fn read(&self, handle: Handle, buf: &mut [u8]) -> Result<usize, DeviceError> {
        LineDisciplineDevice::read(self, handle, buf)
    }

    fn write(&self, handle: Handle, data: &[u8]) -> Result<usize, DeviceError> {
        LineDisciplineDevice::write(self, handle, data)
    }

    fn fsync(&self, handle: Handle) -> Result<(), DeviceError> {
        self.flush(handle)
    }

    fn get_flags(&self, handle: Handle) -> Result<OpenFlags, DeviceError> {
        self.flags(handle)
    }

    fn set_flags(&self, handle: Handle, flags: OpenFlags) -> Result<(), DeviceError> {
        LineDisciplineDevice::set_flags(self, handle, flags)
    }

    fn stat(&self, handle: Handle) -> Result<DeviceStat, DeviceError> {
        LineDisciplineDevice::stat(self, handle)
    }
}

#[cfg(test)]
mod tests;
