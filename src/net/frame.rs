//! The on-wire frame: a fixed 16-byte header followed by an opaque body.
//!
//! ```text
//! byte:    0         8        16
//!          │  len u64 │ seq u64 │ body (len bytes) ...
//! ```
//!
//! No delimiter or escaping is used; the length prefix is authoritative.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::error::FrameError;

/// Header size in bytes: 8 for length, 8 for sequence number.
pub const HEADER_SIZE: usize = 16;

/// A decoded frame: a sequence number and its opaque body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub seq: u64,
    pub body: Vec<u8>,
}

/// Encode `body` under `seq` into a single wire buffer.
pub fn encode(body: &[u8], seq: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE + body.len());
    out.extend_from_slice(&(body.len() as u64).to_be_bytes());
    out.extend_from_slice(&seq.to_be_bytes());
    out.extend_from_slice(body);
    out
}

/// Write `body` under `seq` to `writer`, looping until the whole frame is flushed.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    body: &[u8],
    seq: u64,
) -> Result<(), FrameError> {
    let buf = encode(body, seq);
    writer.write_all(&buf).await?;
    Ok(())
}

/// Read one frame from `reader`, enforcing `max_body` on the decoded length.
///
/// A clean EOF (or the equivalent "connection closed" condition) while reading
/// the header is reported as [`FrameError::Eof`] — the normal shutdown signal,
/// not a failure to be logged as an error. Any other I/O error, or a body
/// length that exceeds `max_body`, aborts the read.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_body: u64,
) -> Result<Frame, FrameError> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            FrameError::Eof
        } else {
            FrameError::Io(e)
        }
    })?;

    let len = u64::from_be_bytes(header[0..8].try_into().unwrap());
    let seq = u64::from_be_bytes(header[8..16].try_into().unwrap());

    if len > max_body {
        return Err(FrameError::TooLarge { len, max: max_body });
    }

    // `len` is bounds-checked above before this cast/allocation.
    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;

    Ok(Frame { seq, body })
}
