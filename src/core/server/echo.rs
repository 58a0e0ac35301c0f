//! Echo role: loop received bytes back to the sender

use super::ConnectionStats;
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Serve one connection until the peer closes or an error occurs
pub(super) async fn serve(
    stream: &mut TcpStream,
    scratch: &mut [u8],
    stats: &mut ConnectionStats,
) -> io::Result<()> {
    loop {
        let received = stream.read(scratch).await?;
        if received == 0 {
            return Ok(());
        }
        stats.bytes_received += received as u64;

        // write_all retries short sends until everything is out
        stream.write_all(&scratch[..received]).await?;
        stats.bytes_sent += received as u64;
    }
}
