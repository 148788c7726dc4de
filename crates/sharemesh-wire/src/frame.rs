//! Frame codec.
//!
//! Every logical message is a 16-bit big-endian byte count followed by that
//! many bytes of UTF-8 text. The only unframed data on a connection is the
//! raw file body of a FETCH reply, whose length is announced by the
//! preceding metadata frame.

use crate::error::{WireError, WireResult};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest payload a single frame can carry.
pub const MAX_FRAME_SIZE: usize = u16::MAX as usize;

/// Encode text as a frame (2-byte big-endian length + bytes).
pub fn encode_frame(text: &str) -> WireResult<Vec<u8>> {
    let body = text.as_bytes();
    if body.len() > MAX_FRAME_SIZE {
        return Err(WireError::FrameTooLarge {
            size: body.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    let mut bytes = Vec::with_capacity(2 + body.len());
    bytes.extend_from_slice(&(body.len() as u16).to_be_bytes());
    bytes.extend_from_slice(body);
    Ok(bytes)
}

/// Decode the length prefix from a 2-byte header.
pub fn decode_length(header: &[u8; 2]) -> usize {
    u16::from_be_bytes(*header) as usize
}

/// Write one frame and flush.
pub async fn write_frame<W>(writer: &mut W, text: &str) -> WireResult<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let bytes = encode_frame(text)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame.
///
/// A clean end-of-stream before the header is reported as
/// [`WireError::ConnectionClosed`].
pub async fn read_frame<R>(reader: &mut R) -> WireResult<String>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header = [0u8; 2];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(WireError::ConnectionClosed);
        }
        Err(e) => return Err(WireError::Io(e)),
    }

    let len = decode_length(&header);
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    String::from_utf8(body).map_err(|_| WireError::InvalidUtf8)
}
