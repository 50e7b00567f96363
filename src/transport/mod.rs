//! Transport module - socket ownership and shared access.
//!
//! Layers, innermost first:
//! - [`SocketTransport`]: owns one byte stream and its read buffer
//! - [`LockedTransport`]: lets many tasks share one socket
//! - [`crate::tls::TlsTransport`]: the locked transport over an encrypted stream
//!
//! Sockets are opened through a [`Connector`], so the TLS layer can hand the
//! same transport code an encrypted stream.

mod backend;
mod config;
mod locked;
mod socket;

use std::future::Future;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

pub use backend::Backend;
pub use config::TransportConfig;
pub use locked::LockedTransport;
pub use socket::{SocketReader, SocketTransport, SocketWriter, TcpConnector};

pub(crate) use socket::open_stream;

/// Byte-level transport capability shared by every layer.
///
/// `read` returns `Ok(None)` on timeout or when nothing could be read; that is
/// not an error. `buffer` puts unconsumed bytes back in front of the next read.
pub trait Transport {
    /// Read whatever is available, waiting at most `timeout` (`None` or zero
    /// waits indefinitely).
    fn read(
        &mut self,
        timeout: Option<Duration>,
    ) -> impl Future<Output = Result<Option<BytesMut>>> + Send;

    /// Re-queue bytes so the next `read` returns them first.
    fn buffer(&mut self, data: &[u8]) -> impl Future<Output = ()> + Send;

    /// Write all of `data` or fail.
    fn write(&mut self, data: &[u8]) -> impl Future<Output = Result<()>> + Send;
}

impl<T> Transport for &mut T
where
    T: Transport + Send,
{
    fn read(
        &mut self,
        timeout: Option<Duration>,
    ) -> impl Future<Output = Result<Option<BytesMut>>> + Send {
        (**self).read(timeout)
    }

    fn buffer(&mut self, data: &[u8]) -> impl Future<Output = ()> + Send {
        (**self).buffer(data)
    }

    fn write(&mut self, data: &[u8]) -> impl Future<Output = Result<()>> + Send {
        (**self).write(data)
    }
}

/// Socket factory.
///
/// Plain TCP uses [`TcpConnector`]; TLS substitutes
/// [`crate::tls::TlsConnector`], which handshakes before returning.
pub trait Connector: Send + Sync {
    /// Connected stream type.
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Open a stream to `addr` (`host:port`).
    fn connect(&self, addr: &str) -> impl Future<Output = Result<Self::Stream>> + Send;
}

/// Treat `None` and zero the same: wait without a deadline.
#[inline]
pub(crate) fn effective_timeout(timeout: Option<Duration>) -> Option<Duration> {
    timeout.filter(|t| !t.is_zero())
}
