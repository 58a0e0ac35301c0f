//! Console service
//!
//! Owns the two console channels and the line discipline device, and
//! starts one listener per endpoint. The device is registered before any
//! listener accepts a connection and stays registered for the life of the
//! service.

use crate::config::{AppConfig, ConfigError};
use crate::core::channel::{ByteChannel, ChannelError};
use crate::core::device::{DeviceError, LineDisciplineDevice, LineEndings};
use crate::core::server::{ConnectionLoop, Role, RoleKind};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Service error types
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Rejected settings
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Channel could not be created
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Device could not be registered
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
}

/// A port and what it serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    /// TCP port (0 picks an ephemeral port)
    pub port: u16,
    /// Listener role
    pub role: RoleKind,
}

/// A listener that is bound and running
#[derive(Debug)]
pub struct RunningEndpoint {
    /// Listener role
    pub role: RoleKind,
    /// Bound address
    pub local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl RunningEndpoint {
    /// Stop accepting; drops any current connection
    pub fn stop(self) {
        self.task.abort();
    }

    /// Has the accept loop ended
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Remote console service
#[derive(Debug)]
pub struct ConsoleService {
    config: AppConfig,
    inbound: ByteChannel,
    outbound: ByteChannel,
    device: Arc<LineDisciplineDevice>,
}

impl ConsoleService {
    /// Create the channels and register the device
    pub fn new(config: &AppConfig) -> Result<Self, ServiceError> {
        config.validate()?;

        let inbound = ByteChannel::new(config.channel_capacity)?;
        let outbound = ByteChannel::new(config.channel_capacity)?;
        let device = Arc::new(LineDisciplineDevice::new(
            inbound.clone(),
            outbound.clone(),
            LineEndings {
                rx: config.line_endings.rx,
                tx: config.line_endings.tx,
            },
        ));
        device.register(Some(&config.device_path))?;

        info!(
            path = %config.device_path,
            capacity = config.channel_capacity,
            rx = %config.line_endings.rx,
            tx = %config.line_endings.tx,
            "Console device ready"
        );

        Ok(Self {
            config: config.clone(),
            inbound,
            outbound,
            device,
        })
    }

    /// The console device
    pub fn device(&self) -> &Arc<LineDisciplineDevice> {
        &self.device
    }

    /// Bytes from the wire
    pub fn inbound(&self) -> &ByteChannel {
        &self.inbound
    }

    /// Bytes to the wire
    pub fn outbound(&self) -> &ByteChannel {
        &self.outbound
    }

    /// Configured endpoints
    pub fn endpoints(&self) -> [Endpoint; 2] {
        [
            Endpoint {
                port: self.config.echo_port,
                role: RoleKind::Echo,
            },
            Endpoint {
                port: self.config.console_port,
                role: RoleKind::Console,
            },
        ]
    }

    fn role(&self, kind: RoleKind) -> Role {
        match kind {
            RoleKind::Echo => Role::Echo,
            RoleKind::Console => Role::Console {
                inbound: self.inbound.clone(),
                outbound: self.outbound.clone(),
            },
        }
    }

    /// Bind and spawn a listener for `endpoint`
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_endpoint(&self, endpoint: Endpoint) -> std::io::Result<RunningEndpoint> {
        let addr = SocketAddr::new(self.config.bind_address, endpoint.port);
        let server = ConnectionLoop::bind(
            addr,
            self.role(endpoint.role),
            self.config.keepalive,
            self.config.scratch_size,
        )?;
        let local_addr = server.local_addr()?;

        Ok(RunningEndpoint {
            role: server.role(),
            local_addr,
            task: server.spawn(),
        })
    }

    /// Start every configured endpoint
    ///
    /// An endpoint that fails to bind is logged and skipped; the others
    /// still start.
    pub fn start(&self) -> Vec<RunningEndpoint> {
        self.endpoints()
            .into_iter()
            .filter_map(|endpoint| match self.start_endpoint(endpoint) {
                Ok(running) => Some(running),
                Err(e) => {
                    error!(
                        port = endpoint.port,
                        role = %endpoint.role,
                        error = %e,
                        "Unable to start listener"
                    );
                    None
                }
            })
            .collect()
    }
}
