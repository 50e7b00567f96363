//! Socket transport shared by many tasks.
//!
//! A connection usually has a loop draining frames and, at the same time,
//! tasks blocked waiting for one specific reply. Both read from the same
//! socket. [`LockedTransport`] keeps that safe:
//!
//! - One reader at a time. A second reader never touches the socket: it
//!   waits for the active read to finish and then returns `Ok(None)`, so it
//!   can recheck whether the frame it waits for has arrived.
//! - Writes are serialized; each `write` reaches the wire contiguously.
//! - When a read finishes, every waiting reader is woken once. The signal is
//!   not sticky: a reader that arrives later waits for the next read.
//!
//! # Architecture
//!
//! ```text
//! Task 1 ─┐                 ┌─► read lock ──► SocketReader ─┐
//! Task 2 ─┼─► LockedTransport                                ├─► Socket
//! Task N ─┘                 └─► write lock ─► SocketWriter ─┘
//! ```

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::{Mutex, MutexGuard, Notify};

use super::config::TransportConfig;
use super::socket::{SocketReader, SocketTransport, SocketWriter};
use super::{effective_timeout, Connector, Transport};
use crate::error::Result;
use crate::protocol::{Frame, FrameCodec};

/// Wakes waiting readers when dropped, so a read that errors or is
/// cancelled still releases them.
///
/// Bounced readers never retry the lock, so they need not observe it
/// released when they wake.
struct WakeReaders<'a>(&'a Notify);

impl Drop for WakeReaders<'_> {
    fn drop(&mut self) {
        self.0.notify_waiters();
    }
}

/// Transport whose reads and writes are mutually exclusive across tasks.
///
/// Share it behind an `Arc`; every method takes `&self`. Locks are not
/// reentrant: a task must not call `buffer` from inside its own `read`.
pub struct LockedTransport<S> {
    reader: Mutex<SocketReader<ReadHalf<S>>>,
    writer: Mutex<SocketWriter<WriteHalf<S>>>,
    read_wait: Notify,
}

impl<S> LockedTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    /// Wrap a raw transport.
    pub fn new(transport: SocketTransport<S>) -> Self {
        let (reader, writer) = transport.into_parts();
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            read_wait: Notify::new(),
        }
    }

    /// Open a stream through `connector` and wrap it.
    pub async fn connect<C>(addr: &str, connector: &C, config: &TransportConfig) -> Result<Self>
    where
        C: Connector<Stream = S>,
    {
        Ok(Self::new(
            SocketTransport::connect(addr, connector, config).await?,
        ))
    }

    /// Run `op` with the read lock, or wait out the active reader.
    ///
    /// Returns `None` if another task holds the read lock; in that case this
    /// call waits until that read finishes (or `timeout` expires) and does no
    /// I/O of its own.
    async fn exclusive_read<'a, T, F, Fut>(&'a self, timeout: Option<Duration>, op: F) -> Option<T>
    where
        F: FnOnce(MutexGuard<'a, SocketReader<ReadHalf<S>>>) -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        // Register interest before checking the lock so a read that finishes
        // in between still wakes us.
        let mut finished = std::pin::pin!(self.read_wait.notified());
        finished.as_mut().enable();

        let guard = match self.reader.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::trace!("read already in progress, waiting for it");
                match effective_timeout(timeout) {
                    Some(limit) => {
                        let _ = tokio::time::timeout(limit, finished).await;
                    }
                    None => finished.await,
                }
                return None;
            }
        };

        let _wake = WakeReaders(&self.read_wait);
        Some(op(guard).await)
    }

    /// Read from the socket, or wait for another task's read to finish.
    ///
    /// Returns `Ok(None)` on timeout and whenever another task was already
    /// reading; the bytes that task read are not shared.
    pub async fn read(&self, timeout: Option<Duration>) -> Result<Option<BytesMut>> {
        self.exclusive_read(timeout, |mut reader| async move {
            reader.read(timeout).await
        })
        .await
        .unwrap_or(Ok(None))
    }

    /// Read once and decode all complete frames, re-buffering a partial
    /// trailing frame before the read lock is released.
    ///
    /// Returns an empty vector on timeout or when another task was reading.
    pub async fn read_frames(
        &self,
        codec: &FrameCodec,
        timeout: Option<Duration>,
    ) -> Result<Vec<Frame>> {
        self.exclusive_read(timeout, |mut reader| async move {
            reader.read_frames(codec, timeout).await
        })
        .await
        .unwrap_or_else(|| Ok(Vec::new()))
    }

    /// Re-queue bytes for the next read. Waits for the read lock.
    pub async fn buffer(&self, data: &[u8]) {
        self.reader.lock().await.buffer(data);
    }

    /// Write all of `data`; concurrent writers are serialized.
    pub async fn write(&self, data: &[u8]) -> Result<()> {
        self.writer.lock().await.write(data).await
    }

    /// Encode and write one frame.
    pub async fn write_frame(&self, frame: &Frame) -> Result<()> {
        frame.check_encodable()?;
        self.write(&frame.encode()).await
    }

    /// Shut down the write side.
    pub async fn close(&self) -> Result<()> {
        self.writer.lock().await.shutdown().await
    }

    /// Check whether a task is currently inside `read`.
    pub fn is_reading(&self) -> bool {
        self.reader.try_lock().is_err()
    }
}

impl<S> From<SocketTransport<S>> for LockedTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    fn from(transport: SocketTransport<S>) -> Self {
        Self::new(transport)
    }
}

impl<S> Transport for &LockedTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    async fn read(&mut self, timeout: Option<Duration>) -> Result<Option<BytesMut>> {
        LockedTransport::read(*self, timeout).await
    }

    async fn buffer(&mut self, data: &[u8]) {
        LockedTransport::buffer(*self, data).await
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        LockedTransport::write(*self, data).await
    }
}
