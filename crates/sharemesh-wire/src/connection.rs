//! Framed connections and the two outbound connection patterns.
//!
//! - **One-shot** ([`request`]): write one frame, collect every frame the
//!   peer sends until it closes the connection. Used for PUBLISH, REMOVE,
//!   SHARE, QUERY, EXCHANGE and gossip.
//! - **Persistent** ([`open_persistent`]): write one frame and hand back
//!   independent read and write halves, so the caller can keep reading
//!   pushed frames while still being able to send (e.g. UNSUBSCRIBE).

use crate::error::{WireError, WireResult};
use crate::frame::{read_frame, write_frame};
use crate::message::Command;
use crate::transport::{BoxedStream, Transport};
use serde::Serialize;
use sharemesh_types::PeerAddress;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tracing::debug;

/// Reading half of a framed connection.
pub struct FrameReader {
    inner: ReadHalf<BoxedStream>,
    timeout: Option<Duration>,
}

impl FrameReader {
    /// Read the next frame, honouring the read timeout if one is set.
    pub async fn read_frame(&mut self) -> WireResult<String> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, read_frame(&mut self.inner))
                .await
                .map_err(|_| WireError::Timeout)?,
            None => read_frame(&mut self.inner).await,
        }
    }

    /// Copy exactly `len` unframed bytes into `sink`.
    pub async fn read_raw<W>(&mut self, len: u64, sink: &mut W) -> WireResult<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut body = (&mut self.inner).take(len);
        let copied = tokio::io::copy(&mut body, sink).await?;
        if copied < len {
            return Err(WireError::ConnectionClosed);
        }
        Ok(copied)
    }

    /// Change the read timeout. `None` blocks indefinitely.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }
}

/// Writing half of a framed connection.
pub struct FrameWriter {
    inner: WriteHalf<BoxedStream>,
}

impl FrameWriter {
    /// Write one text frame.
    pub async fn write_frame(&mut self, text: &str) -> WireResult<()> {
        write_frame(&mut self.inner, text).await
    }

    /// Serialize `value` as JSON and write it as one frame.
    pub async fn write_json<T: Serialize>(&mut self, value: &T) -> WireResult<()> {
        let text = serde_json::to_string(value)?;
        self.write_frame(&text).await
    }

    /// Stream exactly `len` bytes of the file at `path`, unframed.
    pub async fn write_file(&mut self, path: &Path, len: u64) -> WireResult<u64> {
        let file = tokio::fs::File::open(path).await?;
        self.write_raw(file, len).await
    }

    /// Stream exactly `len` bytes from `source`, unframed.
    pub async fn write_raw<R>(&mut self, source: R, len: u64) -> WireResult<u64>
    where
        R: AsyncRead + Unpin,
    {
        let mut body = source.take(len);
        let copied = tokio::io::copy(&mut body, &mut self.inner).await?;
        self.inner.flush().await?;
        if copied < len {
            return Err(WireError::ConnectionClosed);
        }
        Ok(copied)
    }

    /// Flush and close the write direction.
    pub async fn shutdown(&mut self) -> WireResult<()> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

/// Split a stream into framed halves.
pub fn split(stream: BoxedStream, timeout: Option<Duration>) -> (FrameReader, FrameWriter) {
    let (read, write) = tokio::io::split(stream);
    (
        FrameReader {
            inner: read,
            timeout,
        },
        FrameWriter { inner: write },
    )
}

/// One-shot request: send `command`, then collect frames until the peer
/// closes the connection.
///
/// Connection failures are returned as errors. A failure after the request
/// was sent ends collection and returns whatever arrived so far, so a peer
/// that stalls or drops mid-reply simply contributes fewer frames.
pub async fn request(
    transport: &dyn Transport,
    peer: &PeerAddress,
    command: &Command,
    read_timeout: Duration,
) -> WireResult<Vec<String>> {
    let text = command.to_frame()?;
    let stream = transport.connect(peer).await?;
    let (mut reader, mut writer) = split(stream, Some(read_timeout));

    writer.write_frame(&text).await?;
    debug!(peer = %peer, "SENT: {}", text);

    let mut frames = Vec::new();
    loop {
        match reader.read_frame().await {
            Ok(frame) => {
                debug!(peer = %peer, "RECEIVED: {}", frame);
                frames.push(frame);
            }
            Err(WireError::ConnectionClosed) => break,
            Err(e) => {
                debug!(peer = %peer, error = %e, "Lost connection");
                break;
            }
        }
    }
    let _ = writer.shutdown().await;
    Ok(frames)
}

/// Persistent request: send `command` and return both halves of the open
/// connection. The reader has no timeout.
pub async fn open_persistent(
    transport: &dyn Transport,
    peer: &PeerAddress,
    command: &Command,
) -> WireResult<(FrameReader, FrameWriter)> {
    let text = command.to_frame()?;
    let stream = transport.connect(peer).await?;
    let (reader, mut writer) = split(stream, None);
    writer.write_frame(&text).await?;
    debug!(peer = %peer, "SENT (persistent): {}", text);
    Ok((reader, writer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Response, ResultSize};
    use crate::transport::PlainTransport;
    use sharemesh_types::Resource;
    use tokio::net::TcpListener;

    fn duplex_pair() -> ((FrameReader, FrameWriter), (FrameReader, FrameWriter)) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        (split(Box::new(a), None), split(Box::new(b), None))
    }

    #[tokio::test]
    async fn test_frames_and_raw_bytes_interleave() {
        let ((_, mut writer), (mut reader, _)) = duplex_pair();

        let payload = b"hello raw world".to_vec();
        writer.write_frame("{\"resourceSize\":15}").await.unwrap();
        writer
            .write_raw(&payload[..], payload.len() as u64)
            .await
            .unwrap();
        writer.write_frame("{\"resultSize\":1}").await.unwrap();

        assert_eq!(reader.read_frame().await.unwrap(), "{\"resourceSize\":15}");
        let mut sink = Vec::new();
        assert_eq!(reader.read_raw(15, &mut sink).await.unwrap(), 15);
        assert_eq!(sink, payload);
        assert_eq!(reader.read_frame().await.unwrap(), "{\"resultSize\":1}");
    }

    #[tokio::test]
    async fn test_read_timeout() {
        let ((_keep, _w), (mut reader, _)) = duplex_pair();
        reader.set_timeout(Some(Duration::from_millis(50)));
        assert!(matches!(reader.read_frame().await, Err(WireError::Timeout)));
    }

    #[tokio::test]
    async fn test_one_shot_request_collects_until_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (mut reader, mut writer) = split(Box::new(socket), None);
            let frame = reader.read_frame().await.unwrap();
            assert!(frame.contains("QUERY"));
            writer.write_json(&Response::success()).await.unwrap();
            writer.write_json(&ResultSize::new(0)).await.unwrap();
            writer.shutdown().await.unwrap();
        });

        let frames = request(
            &PlainTransport,
            &PeerAddress::new("127.0.0.1", port),
            &Command::Query {
                resource_template: Resource::default(),
                relay: false,
            },
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(
            frames,
            vec![
                r#"{"response":"success"}"#.to_string(),
                r#"{"resultSize":0}"#.to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_one_shot_request_unreachable_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = request(
            &PlainTransport,
            &PeerAddress::new("127.0.0.1", port),
            &Command::Exchange {
                server_list: vec![],
            },
            Duration::from_secs(1),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_persistent_connection_keeps_both_directions() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (mut reader, mut writer) = split(Box::new(socket), None);
            let _subscribe = reader.read_frame().await.unwrap();
            writer
                .write_json(&Response::subscribed("r1"))
                .await
                .unwrap();
            let unsubscribe = reader.read_frame().await.unwrap();
            assert!(unsubscribe.contains("UNSUBSCRIBE"));
            writer.write_json(&ResultSize::new(0)).await.unwrap();
        });

        let (mut reader, mut writer) = open_persistent(
            &PlainTransport,
            &PeerAddress::new("127.0.0.1", port),
            &Command::Subscribe {
                resource_template: Resource::default(),
                relay: false,
                id: "r1".to_string(),
            },
        )
        .await
        .unwrap();

        assert!(reader.read_frame().await.unwrap().contains("success"));
        writer
            .write_json(&Command::Unsubscribe {
                id: "r1".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(reader.read_frame().await.unwrap(), r#"{"resultSize":0}"#);
    }
}
