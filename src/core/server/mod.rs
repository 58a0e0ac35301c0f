//! TCP listeners for the remote console
//!
//! Each listener serves one connection at a time; further clients wait in
//! the OS backlog until the current one goes away. A listener runs until
//! the process (or its task) is torn down.
//!
//! Roles:
//! - Echo: every received byte is sent straight back
//! - Console: bytes are relayed between the socket and the console channels

mod console;
mod echo;

use crate::core::channel::ByteChannel;
use serde::{Deserialize, Serialize};
use socket2::{SockRef, TcpKeepalive};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default per-connection scratch buffer size, in bytes
pub const DEFAULT_SCRATCH_SIZE: usize = 1024;

/// Log target of per-transfer relay events
///
/// These describe traffic on the console itself and must never be mirrored
/// back into it.
pub const RELAY_TARGET: &str = "ethcon::relay";

/// Pause after a failed accept before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Keepalive probing applied to accepted connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepaliveConfig {
    /// Idle time before the first probe, in seconds
    pub idle_secs: u64,
    /// Interval between probes, in seconds
    pub interval_secs: u64,
    /// Unanswered probes before the connection is dropped
    pub count: u32,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            idle_secs: 5,
            interval_secs: 5,
            count: 3,
        }
    }
}

impl KeepaliveConfig {
    fn apply(&self, stream: &TcpStream) -> io::Result<()> {
        let keepalive = TcpKeepalive::new().with_time(Duration::from_secs(self.idle_secs));
        #[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
        let keepalive = keepalive.with_interval(Duration::from_secs(self.interval_secs));
        #[cfg(any(target_os = "linux", target_os = "macos"))]
        let keepalive = keepalive.with_retries(self.count);

        SockRef::from(stream).set_tcp_keepalive(&keepalive)
    }
}

/// Listener role identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoleKind {
    /// Loopback
    Echo,
    /// Console relay
    Console,
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Echo => write!(f, "echo"),
            Self::Console => write!(f, "console"),
        }
    }
}

/// What a listener does with its connections
#[derive(Debug, Clone)]
pub enum Role {
    /// Send every received byte straight back
    Echo,
    /// Relay between the socket and the console channels
    Console {
        /// Bytes from the wire, read by the device
        inbound: ByteChannel,
        /// Bytes to the wire, written by the device
        outbound: ByteChannel,
    },
}

impl Role {
    /// Role identifier
    pub fn kind(&self) -> RoleKind {
        match self {
            Self::Echo => RoleKind::Echo,
            Self::Console { .. } => RoleKind::Console,
        }
    }
}

/// Byte counters for one connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Bytes read from the socket
    pub bytes_received: u64,
    /// Bytes written to the socket
    pub bytes_sent: u64,
}

/// Accept loop for one listening port
#[derive(Debug)]
pub struct ConnectionLoop {
    listener: TcpListener,
    role: Role,
    keepalive: KeepaliveConfig,
    scratch_size: usize,
}

impl ConnectionLoop {
    /// Bind and listen on `addr`
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(
        addr: SocketAddr,
        role: Role,
        keepalive: KeepaliveConfig,
        scratch_size: usize,
    ) -> io::Result<Self> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(1)?;

        info!(addr = %listener.local_addr()?, role = %role.kind(), "Socket bound");

        Ok(Self {
            listener,
            role,
            keepalive,
            scratch_size: scratch_size.max(1),
        })
    }

    /// Address actually bound (resolves port 0)
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Role identifier
    pub fn role(&self) -> RoleKind {
        self.role.kind()
    }

    /// Run the accept loop on a new task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Accept and serve connections, one at a time, forever
    pub async fn run(self) {
        // A received span must fit in the inbound channel
        let scratch_len = match &self.role {
            Role::Echo => self.scratch_size,
            Role::Console { inbound, .. } => self.scratch_size.min(inbound.capacity()),
        };
        let mut scratch = vec![0u8; scratch_len];
        let role = self.role.kind();

        loop {
            debug!(%role, "Socket listening");
            let (mut stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(%role, error = %e, "Unable to accept connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            if let Err(e) = self.keepalive.apply(&stream) {
                warn!(%peer, error = %e, "Unable to configure keepalive");
            }
            info!(%peer, %role, "Connection accepted");

            let mut stats = ConnectionStats::default();
            let result = match &self.role {
                Role::Echo => echo::serve(&mut stream, &mut scratch, &mut stats).await,
                Role::Console { inbound, outbound } => {
                    console::serve(&mut stream, inbound, outbound, &mut scratch, &mut stats).await
                }
            };

            match result {
                Ok(()) => info!(
                    %peer,
                    received = stats.bytes_received,
                    sent = stats.bytes_sent,
                    "Connection closed"
                ),
                Err(e) => warn!(
                    %peer,
                    received = stats.bytes_received,
                    sent = stats.bytes_sent,
                    error = %e,
                    "Connection aborted"
                ),
            }

            stream.shutdown().await.ok();
        }
    }
}
