//! Console role: relay between a socket and the console channels
//!
//! Each pass first drains everything queued for the wire, then waits for
//! whichever comes first: bytes from the socket or new outbound data.
//! Nothing spins while the line is idle.

use super::{ConnectionStats, RELAY_TARGET};
use crate::core::channel::{ByteChannel, Wait};
use crate::core::codec::escape_bytes;
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};

/// Serve one connection until the peer closes or an error occurs
pub(super) async fn serve(
    stream: &mut TcpStream,
    inbound: &ByteChannel,
    outbound: &ByteChannel,
    scratch: &mut [u8],
    stats: &mut ConnectionStats,
) -> io::Result<()> {
    loop {
        drain(stream, outbound, scratch.len(), stats).await?;

        tokio::select! {
            received = stream.read(scratch) => {
                let received = received?;
                if received == 0 {
                    return Ok(());
                }
                let data = &scratch[..received];
                debug!(target: RELAY_TARGET, bytes = received, "Eth -> Console");
                trace!(target: RELAY_TARGET, data = %escape_bytes(data));

                // Backpressure: wait as long as the reader needs
                inbound
                    .send_async(data)
                    .await
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                stats.bytes_received += received as u64;
            }
            () = outbound.readable() => {}
        }
    }
}

/// Write every queued outbound byte to the socket
async fn drain(
    stream: &mut TcpStream,
    outbound: &ByteChannel,
    max_chunk: usize,
    stats: &mut ConnectionStats,
) -> io::Result<()> {
    while let Some(chunk) = outbound.receive_upto(max_chunk, Wait::Poll) {
        debug!(target: RELAY_TARGET, bytes = chunk.len(), "Console -> Eth");
        trace!(target: RELAY_TARGET, data = %escape_bytes(&chunk));

        stream.write_all(chunk.as_bytes()).await?;
        stats.bytes_sent += chunk.len() as u64;
        // Released only once on the wire, so a flush sees it as pending
        chunk.release();
    }
    Ok(())
}
