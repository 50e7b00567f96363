//! # amqp-wire
//!
//! Framing and transport core for AMQP 0-9-1 clients.
//!
//! The crate turns a byte stream into frames and lets many tasks share one
//! broker connection. Method encoding, channel negotiation and the
//! client-facing API live in the layers above.
//!
//! ## Architecture
//!
//! - **Frame codec** ([`protocol`]): `[type:1][channel:2][size:4][payload][0xCE]`,
//!   frame types looked up in an explicit [`FrameTypeRegistry`]
//! - **Socket transport** ([`transport::SocketTransport`]): one stream, timed
//!   reads, re-buffering of unconsumed bytes
//! - **Shared transport** ([`LockedTransport`]): one reader at a time,
//!   serialized writes, bounced readers woken when a read finishes
//! - **TLS** ([`tls`]): rustls handshake on connect, hostname check against
//!   the peer certificate subject
//!
//! ## Example
//!
//! ```ignore
//! use amqp_wire::{Frame, FrameCodec, LockedTransport, TcpConnector, TransportConfig};
//! use amqp_wire::protocol::frame_type;
//!
//! #[tokio::main]
//! async fn main() -> amqp_wire::Result<()> {
//!     let config = TransportConfig::default();
//!     let transport =
//!         LockedTransport::connect("127.0.0.1:5672", &TcpConnector::default(), &config).await?;
//!
//!     transport.write_frame(&Frame::heartbeat()).await?;
//!     for frame in transport.read_frames(&FrameCodec::amqp(), None).await? {
//!         if frame.frame_type() == frame_type::METHOD {
//!             // hand to the method layer
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod protocol;
pub mod tls;
pub mod transport;

pub use error::{Result, WireError};
pub use protocol::{Frame, FrameCodec, FrameHeader, FrameTypeRegistry};
pub use tls::{CertRequirement, PeerCertificate, TlsConnector, TlsParams, TlsTransport};
pub use transport::{
    Backend, Connector, LockedTransport, SocketTransport, TcpConnector, Transport, TransportConfig,
};
