//! Ethcon - remote line console
//!
//! Serves a newline-translating console device over TCP:
//! - an echo port for link checks
//! - a console port relaying to and from the device
//!
//! With `--attach` the local stdin/stdout are wired to the device.

use anyhow::Context;
use clap::Parser;
use ethcon_core::{
    AppConfig, CliResult, ConsoleService, DeviceLogWriter, DeviceStream, LineDisciplineDevice,
    LineEnding, OpenFlags, RunningEndpoint,
};
use std::io::{self, Read, Write};
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

/// Ethcon CLI
#[derive(Parser, Debug)]
#[command(
    name = "ethcon",
    version,
    about = "Remote line console over TCP",
    long_about = None
)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, env = "ETHCON_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind both listeners to
    #[arg(short, long)]
    bind: Option<IpAddr>,

    /// Echo listener port
    #[arg(long)]
    echo_port: Option<u16>,

    /// Console listener port
    #[arg(long)]
    console_port: Option<u16>,

    /// Newline convention expected from clients (lf, cr, crlf)
    #[arg(long)]
    rx: Option<LineEnding>,

    /// Newline convention sent to clients (lf, cr, crlf)
    #[arg(long)]
    tx: Option<LineEnding>,

    /// Channel capacity in bytes
    #[arg(long)]
    capacity: Option<usize>,

    /// Log filter directive (e.g. debug, ethcon_core=trace)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Also write rotated log files to DIR (default: the platform data directory)
    #[arg(long, value_name = "DIR")]
    log_dir: Option<Option<PathBuf>>,

    /// Copy log output to the remote console
    #[arg(long)]
    mirror_logs: bool,

    /// Wire local stdin/stdout to the console device
    #[arg(short, long)]
    attach: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,

    /// Print the exit code table and exit
    #[arg(long)]
    exit_codes: bool,
}

impl Cli {
    fn load_config(&self) -> Result<AppConfig, CliResult> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load_from(path)?,
            None => AppConfig::load()?,
        };

        if let Some(bind) = self.bind {
            config.bind_address = bind;
        }
        if let Some(port) = self.echo_port {
            config.echo_port = port;
        }
        if let Some(port) = self.console_port {
            config.console_port = port;
        }
        if let Some(rx) = self.rx {
            config.line_endings.rx = rx;
        }
        if let Some(tx) = self.tx {
            config.line_endings.tx = tx;
        }
        if let Some(capacity) = self.capacity {
            config.channel_capacity = capacity;
        }
        if let Some(level) = &self.log_level {
            config.logging.level.clone_from(level);
        }
        if let Some(dir) = &self.log_dir {
            config.logging.enable_file_output(dir.clone())?;
        }
        if self.mirror_logs {
            config.logging.mirror_to_console = true;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = run(&cli).await;
    if let Some(msg) = result.message() {
        if result.is_success() {
            println!("{msg}");
        } else {
            eprintln!("error: {msg}");
        }
    }
    result.to_exit_code()
}

async fn run(cli: &Cli) -> CliResult {
    if cli.exit_codes {
        ethcon_core::cli::print_exit_codes();
        return CliResult::success();
    }

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(result) => return result,
    };

    if cli.print_config {
        return match config.to_toml() {
            Ok(toml) => CliResult::Success(Some(toml)),
            Err(e) => e.into(),
        };
    }

    let service = match ConsoleService::new(&config) {
        Ok(service) => service,
        Err(e) => return e.into(),
    };

    let mirror = config
        .logging
        .mirror_to_console
        .then(|| DeviceLogWriter::new(Arc::clone(service.device())));
    let _log_guard = match ethcon_core::logging::init(&config.logging, mirror) {
        Ok(guard) => guard,
        Err(e) => return CliResult::error(ethcon_core::ExitCodes::CONFIG_ERROR, e.to_string()),
    };

    tracing::info!("Starting {} v{}", ethcon_core::NAME, ethcon_core::VERSION);

    match serve(cli, &service).await {
        Ok(()) => CliResult::success(),
        Err(e) => CliResult::listen_failed(format!("{e:#}")),
    }
}

async fn serve(cli: &Cli, service: &ConsoleService) -> anyhow::Result<()> {
    let endpoints = service.start();
    anyhow::ensure!(!endpoints.is_empty(), "no listener could be started");

    for endpoint in &endpoints {
        tracing::info!(role = %endpoint.role, addr = %endpoint.local_addr, "Listening");
    }

    if cli.attach {
        attach_stdio(service.device()).context("attaching stdin/stdout")?;
    }

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    tracing::info!("Shutting down");

    endpoints.into_iter().for_each(RunningEndpoint::stop);
    Ok(())
}

/// Pump stdin into the device and device output to stdout
///
/// Both threads are detached; they end with the process.
fn attach_stdio(device: &Arc<LineDisciplineDevice>) -> io::Result<()> {
    let mut from_device = DeviceStream::open(Arc::clone(device), OpenFlags::blocking());
    let mut to_device = DeviceStream::open(Arc::clone(device), OpenFlags::blocking());

    thread::Builder::new()
        .name("console-out".into())
        .spawn(move || {
            let mut stdout = io::stdout();
            let mut buf = [0u8; 256];
            loop {
                let copied = from_device
                    .read(&mut buf)
                    .and_then(|n| stdout.write_all(&buf[..n]))
                    .and_then(|()| stdout.flush());
                if let Err(e) = copied {
                    tracing::warn!(error = %e, "Console output stopped");
                    break;
                }
            }
        })?;

    thread::Builder::new()
        .name("console-in".into())
        .spawn(move || {
            let mut stdin = io::stdin().lock();
            match io::copy(&mut stdin, &mut to_device) {
                Ok(bytes) => tracing::debug!(bytes, "Local input closed"),
                Err(e) => tracing::warn!(error = %e, "Console input stopped"),
            }
        })?;

    Ok(())
}
