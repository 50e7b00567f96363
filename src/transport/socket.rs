//! Raw socket transport.
//!
//! [`SocketTransport`] owns one connected stream, split into a
//! [`SocketReader`] (stream read half plus the unconsumed-byte buffer) and a
//! [`SocketWriter`]. The halves are separate so the locking layer can guard
//! them with independent locks.
//!
//! # Example
//!
//! ```ignore
//! use amqp_wire::protocol::FrameCodec;
//! use amqp_wire::transport::{SocketTransport, TcpConnector, TransportConfig};
//!
//! let config = TransportConfig::default();
//! let mut transport =
//!     SocketTransport::connect("127.0.0.1:5672", &TcpConnector::new(true), &config).await?;
//! transport.write(b"AMQP\x00\x00\x09\x01").await?;
//! let frames = transport.read_frames(&FrameCodec::amqp(), None).await?;
//! ```

use std::io;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;

use super::config::TransportConfig;
use super::{effective_timeout, Connector, Transport};
use crate::error::{Result, WireError};
use crate::protocol::{Frame, FrameCodec};

/// Plain TCP socket factory.
#[derive(Debug, Clone, Copy)]
pub struct TcpConnector {
    nodelay: bool,
}

impl TcpConnector {
    /// Create a connector; `nodelay` sets TCP_NODELAY on each socket.
    pub fn new(nodelay: bool) -> Self {
        Self { nodelay }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, addr: &str) -> Result<TcpStream> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(self.nodelay)?;
        tracing::debug!(addr, "tcp connected");
        Ok(stream)
    }
}

/// Open a stream through `connector`, bounded by the configured connect
/// timeout.
pub(crate) async fn open_stream<C: Connector>(
    connector: &C,
    addr: &str,
    config: &TransportConfig,
) -> Result<C::Stream> {
    match effective_timeout(config.connect_timeout) {
        Some(limit) => tokio::time::timeout(limit, connector.connect(addr))
            .await
            .map_err(|_| WireError::Timeout {
                operation: "connect",
            })?,
        None => connector.connect(addr).await,
    }
}

/// Errors that mean "nothing to read right now" rather than a broken socket.
fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Read half of a socket with its pending-byte buffer.
pub struct SocketReader<R> {
    /// Stream read half.
    reader: R,
    /// Bytes received (or re-queued) but not yet handed out.
    buffer: BytesMut,
    /// Capacity reserved per receive.
    read_size: usize,
}

impl<R: AsyncRead + Unpin> SocketReader<R> {
    /// Wrap a read half.
    pub fn new(reader: R, read_size: usize) -> Self {
        Self {
            reader,
            buffer: BytesMut::with_capacity(read_size),
            read_size,
        }
    }

    /// One receive bounded by `timeout`.
    ///
    /// Returns previously buffered bytes followed by the newly received ones,
    /// or `Ok(None)` on timeout. A timeout leaves buffered bytes in place.
    ///
    /// # Errors
    ///
    /// `ConnectionClosed` when the peer closed the stream, `Io` on socket
    /// failure.
    pub async fn read(&mut self, timeout: Option<Duration>) -> Result<Option<BytesMut>> {
        self.buffer.reserve(self.read_size);

        // read_buf is cancel safe: a timed-out receive appends nothing.
        let receive = self.reader.read_buf(&mut self.buffer);
        let received = match effective_timeout(timeout) {
            Some(limit) => match tokio::time::timeout(limit, receive).await {
                Ok(result) => result,
                Err(_) => return Ok(None),
            },
            None => receive.await,
        };

        match received {
            Ok(0) => {
                tracing::debug!(buffered = self.buffer.len(), "peer closed connection");
                Err(WireError::ConnectionClosed)
            }
            Ok(n) => {
                tracing::trace!(bytes = n, "socket read");
                Ok(Some(self.buffer.split()))
            }
            Err(e) if is_transient(&e) => Ok(None),
            Err(e) => Err(WireError::Io(e)),
        }
    }

    /// Re-queue bytes in front of anything still buffered.
    pub fn buffer(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let mut joined = BytesMut::with_capacity(data.len() + self.buffer.len());
        joined.extend_from_slice(data);
        self.requeue(joined);
    }

    /// Put an owned leftover back at the front without copying it.
    fn requeue(&mut self, mut leftover: BytesMut) {
        if leftover.is_empty() {
            return;
        }
        leftover.unsplit(std::mem::take(&mut self.buffer));
        self.buffer = leftover;
    }

    /// Read once and decode every complete frame.
    ///
    /// A trailing partial frame goes back into the buffer for the next call.
    /// A timeout yields an empty vector.
    pub async fn read_frames(
        &mut self,
        codec: &FrameCodec,
        timeout: Option<Duration>,
    ) -> Result<Vec<Frame>> {
        let Some(mut data) = self.read(timeout).await? else {
            return Ok(Vec::new());
        };
        let frames = codec.decode_all(&mut data)?;
        self.requeue(data);
        Ok(frames)
    }

    /// Number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}

/// Write half of a socket.
///
/// A write that fails or is dropped partway may leave a frame prefix on the
/// wire. The writer then refuses further writes, since anything appended
/// after the prefix would be read as part of the broken frame.
pub struct SocketWriter<W> {
    writer: W,
    timeout: Option<Duration>,
    /// Set while a write is in flight; stays set if it never completed.
    failed: bool,
}

impl<W: AsyncWrite + Unpin> SocketWriter<W> {
    /// Wrap a write half; `timeout` bounds each write.
    pub fn new(writer: W, timeout: Option<Duration>) -> Self {
        Self {
            writer,
            timeout,
            failed: false,
        }
    }

    /// Send all of `data` and flush.
    ///
    /// # Errors
    ///
    /// Any failure, including a timeout, may leave part of `data` on the wire
    /// and is fatal for the connection: every later call returns
    /// `ConnectionClosed`.
    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.failed {
            return Err(WireError::ConnectionClosed);
        }
        // Cleared only on success, so a cancelled write also poisons.
        self.failed = true;

        let limit = effective_timeout(self.timeout);
        let writer = &mut self.writer;
        let send = async move {
            writer.write_all(data).await?;
            writer.flush().await
        };

        let result = match limit {
            Some(limit) => tokio::time::timeout(limit, send)
                .await
                .map_err(|_| WireError::Timeout { operation: "write" })
                .and_then(|sent| sent.map_err(WireError::Io)),
            None => send.await.map_err(WireError::Io),
        };

        if let Err(e) = &result {
            tracing::warn!(error = %e, bytes = data.len(), "socket write failed, writer disabled");
            return result;
        }

        self.failed = false;
        tracing::trace!(bytes = data.len(), "socket write");
        Ok(())
    }

    /// Check whether an earlier write failed or was cancelled.
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Shut down the write side.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

/// Raw transport over one stream.
pub struct SocketTransport<S> {
    reader: SocketReader<ReadHalf<S>>,
    writer: SocketWriter<WriteHalf<S>>,
}

impl<S> SocketTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    /// Wrap an already connected stream.
    pub fn new(stream: S, config: &TransportConfig) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: SocketReader::new(read_half, config.read_buffer_size),
            writer: SocketWriter::new(write_half, config.write_timeout),
        }
    }

    /// Open a stream through `connector` and wrap it.
    ///
    /// # Errors
    ///
    /// `Timeout` if `config.connect_timeout` expires, otherwise whatever the
    /// connector reports.
    pub async fn connect<C>(addr: &str, connector: &C, config: &TransportConfig) -> Result<Self>
    where
        C: Connector<Stream = S>,
    {
        let stream = open_stream(connector, addr, config).await?;
        Ok(Self::new(stream, config))
    }

    /// See [`SocketReader::read`].
    pub async fn read(&mut self, timeout: Option<Duration>) -> Result<Option<BytesMut>> {
        self.reader.read(timeout).await
    }

    /// See [`SocketReader::buffer`].
    pub fn buffer(&mut self, data: &[u8]) {
        self.reader.buffer(data);
    }

    /// See [`SocketWriter::write`].
    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write(data).await
    }

    /// See [`SocketReader::read_frames`].
    pub async fn read_frames(
        &mut self,
        codec: &FrameCodec,
        timeout: Option<Duration>,
    ) -> Result<Vec<Frame>> {
        self.reader.read_frames(codec, timeout).await
    }

    /// Encode and write one frame.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        frame.check_encodable()?;
        self.writer.write(&frame.encode()).await
    }

    /// Shut down the write side.
    pub async fn close(&mut self) -> Result<()> {
        self.writer.shutdown().await
    }

    /// Number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.reader.buffered_len()
    }

    /// Split into read and write halves.
    pub fn into_parts(self) -> (SocketReader<ReadHalf<S>>, SocketWriter<WriteHalf<S>>) {
        (self.reader, self.writer)
    }
}

impl<S> Transport for SocketTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    async fn read(&mut self, timeout: Option<Duration>) -> Result<Option<BytesMut>> {
        SocketTransport::read(self, timeout).await
    }

    async fn buffer(&mut self, data: &[u8]) {
        SocketTransport::buffer(self, data);
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        SocketTransport::write(self, data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame_type;
    use bytes::Bytes;
    use tokio::io::{duplex, DuplexStream};

    fn pair() -> (SocketTransport<DuplexStream>, DuplexStream) {
        let (client, server) = duplex(4096);
        (
            SocketTransport::new(client, &TransportConfig::default()),
            server,
        )
    }

    #[tokio::test]
    async fn test_read_returns_received_bytes() {
        let (mut transport, mut server) = pair();
        server.write_all(b"hello").await.unwrap();

        let data = transport.read(None).await.unwrap().unwrap();
        assert_eq!(&data[..], b"hello");
    }

    #[tokio::test]
    async fn test_read_timeout_returns_none() {
        let (mut transport, _server) = pair();

        let data = transport
            .read(Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert!(data.is_none());
    }

    #[tokio::test]
    async fn test_buffered_bytes_survive_timeout() {
        let (mut transport, mut server) = pair();
        transport.buffer(b"left");

        let data = transport
            .read(Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert!(data.is_none());
        assert_eq!(transport.buffered_len(), 4);

        server.write_all(b"over").await.unwrap();
        let data = transport.read(None).await.unwrap().unwrap();
        assert_eq!(&data[..], b"leftover");
        assert_eq!(transport.buffered_len(), 0);
    }

    #[tokio::test]
    async fn test_buffer_prepends_to_pending_bytes() {
        let (mut transport, mut server) = pair();
        transport.buffer(b"world");
        transport.buffer(b"hello ");
        assert_eq!(transport.buffered_len(), 11);

        server.write_all(b"!").await.unwrap();
        let data = transport.read(None).await.unwrap().unwrap();
        assert_eq!(&data[..], b"hello world!");
    }

    #[tokio::test]
    async fn test_peer_close_is_error() {
        let (mut transport, server) = pair();
        drop(server);

        let result = transport.read(None).await;
        assert!(matches!(result, Err(WireError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_write_delivers_all_bytes() {
        let (mut transport, mut server) = pair();
        let payload = vec![0x5A; 3000];

        transport.write(&payload).await.unwrap();

        let mut received = vec![0u8; 3000];
        server.read_exact(&mut received).await.unwrap();
        assert_eq!(received, payload);
    }

    #[tokio::test]
    async fn test_write_timeout_when_peer_stalls() {
        let (client, _server) = duplex(16);
        let config = TransportConfig::default().write_timeout(Some(Duration::from_millis(20)));
        let mut transport = SocketTransport::new(client, &config);

        let result = transport.write(&[0u8; 64]).await;
        assert!(matches!(
            result,
            Err(WireError::Timeout { operation: "write" })
        ));
    }

    #[tokio::test]
    async fn test_writes_refused_after_partial_write() {
        let (client, mut server) = duplex(16);
        let config = TransportConfig::default().write_timeout(Some(Duration::from_millis(20)));
        let mut transport = SocketTransport::new(client, &config);
        let body = Frame::new(frame_type::BODY, 1, Bytes::from(vec![0x11; 64]));

        let result = transport.write_frame(&body).await;
        assert!(matches!(result, Err(WireError::Timeout { operation: "write" })));

        let result = transport.write_frame(&Frame::heartbeat()).await;
        assert!(matches!(result, Err(WireError::ConnectionClosed)));

        // Only the prefix of the first frame reached the peer.
        let mut received = vec![0u8; 64];
        let n = tokio::time::timeout(Duration::from_millis(50), server.read(&mut received))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n, 16);
        let more = tokio::time::timeout(Duration::from_millis(20), server.read(&mut received)).await;
        assert!(more.is_err());
    }

    #[tokio::test]
    async fn test_cancelled_write_disables_writer() {
        let (client, _server) = duplex(16);
        let (_, write_half) = tokio::io::split(client);
        let mut writer = SocketWriter::new(write_half, None);

        let cancelled =
            tokio::time::timeout(Duration::from_millis(20), writer.write(&[0u8; 64])).await;
        assert!(cancelled.is_err());
        assert!(writer.is_failed());

        let result = writer.write(b"x").await;
        assert!(matches!(result, Err(WireError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_read_frames_rebuffers_partial_frame() {
        let (mut transport, mut server) = pair();
        let codec = FrameCodec::amqp();
        let first = Frame::new(frame_type::METHOD, 1, Bytes::from_static(b"first")).encode();
        let second = Frame::new(frame_type::BODY, 1, Bytes::from_static(b"second")).encode();

        server.write_all(&first).await.unwrap();
        server.write_all(&second[..4]).await.unwrap();

        let frames = transport.read_frames(&codec, None).await.unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), b"first");
        assert_eq!(transport.buffered_len(), 4);

        server.write_all(&second[4..]).await.unwrap();
        let frames = transport.read_frames(&codec, None).await.unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), b"second");
        assert_eq!(transport.buffered_len(), 0);
    }

    #[tokio::test]
    async fn test_write_frame() {
        let (mut transport, mut server) = pair();

        transport.write_frame(&Frame::heartbeat()).await.unwrap();

        let mut received = [0u8; 8];
        server.read_exact(&mut received).await.unwrap();
        assert_eq!(received, [8, 0, 0, 0, 0, 0, 0, 0xCE]);
    }

    #[tokio::test]
    async fn test_tcp_connect_timeout() {
        // Non-routable address; either the timeout or an immediate network
        // error is acceptable, but it must not hang.
        let config = TransportConfig::default().connect_timeout(Some(Duration::from_millis(50)));
        let result =
            SocketTransport::connect("10.255.255.1:5672", &TcpConnector::default(), &config).await;
        assert!(result.is_err());
    }
}
