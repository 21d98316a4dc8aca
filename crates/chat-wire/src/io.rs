//! Framed socket I/O.
//!
//! Reads on a connection are owned by exactly one task and never locked;
//! writes go through the connection's shared write mutex so that concurrent
//! senders interleave whole frames, never bytes.
//!
//! Single-frame reads (`read_frame`) serve the request/response handshakes:
//! registration, election probes, heartbeats, replication acks.  Long-lived
//! handlers use `read_loop`, which runs until the peer goes away.

use crate::frame::{HEADER_LEN, Header};
use crate::{Frame, WireError};
use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::trace;

/// A connection's write half behind its write mutex.
pub type SharedWriter<W> = Arc<Mutex<W>>;

/// Read exactly one frame.
///
/// EOF, a malformed header, a body shorter than its declared length, and
/// invalid body bytes all collapse to [`WireError::ConnectionClosed`]: there
/// is no way to find the next frame boundary once the stream is suspect.
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut header_bytes = [0u8; HEADER_LEN];
    reader
        .read_exact(&mut header_bytes)
        .await
        .map_err(|_| WireError::ConnectionClosed)?;
    let header = Header::parse(&header_bytes)?;

    let mut body = vec![0u8; header.body_len as usize];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|_| WireError::ConnectionClosed)?;

    let frame = Frame::decode(header, &body).map_err(|_| WireError::ConnectionClosed)?;
    trace!(op = ?frame.op(), msg_id = frame.msg_id, "frame in");
    Ok(frame)
}

/// Read frames until the connection closes, handing each to `handler`.
pub async fn read_loop<R, F, Fut>(reader: &mut R, mut handler: F)
where
    R: AsyncRead + Unpin,
    F: FnMut(Frame) -> Fut,
    Fut: Future<Output = ()>,
{
    loop {
        match read_frame(reader).await {
            Ok(frame) => handler(frame).await,
            Err(_) => return,
        }
    }
}

/// Write one whole frame under the connection's write mutex.
pub async fn send<W>(writer: &SharedWriter<W>, frame: &Frame) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = frame.encode()?;
    let mut guard = writer.lock().await;
    guard.write_all(&bytes).await?;
    guard.flush().await?;
    trace!(op = ?frame.op(), msg_id = frame.msg_id, "frame out");
    Ok(())
}
