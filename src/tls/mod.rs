//! TLS layer.
//!
//! [`TlsConnector`] is a [`Connector`](crate::transport::Connector) that
//! opens TCP and completes a rustls handshake before handing the stream to
//! the shared transport. [`TlsTransport`] is that shared transport plus the
//! peer certificate, with read timeouts reported exactly as on plain TCP.
//!
//! ```ignore
//! use amqp_wire::tls::{TlsConnector, TlsParams, TlsTransport};
//!
//! let params = TlsParams::new()
//!     .ca_certs("/etc/amqp/ca.pem")
//!     .server_hostname("broker.internal");
//! let connector = TlsConnector::initialize("tokio", &params)?;
//! let transport =
//!     TlsTransport::connect_verified(&connector, "10.0.0.5:5671", "broker.internal").await?;
//! ```

mod danger;
mod params;
mod transport;
mod verify;

pub use params::{supported_cipher_suites, CertRequirement, ProtocolVersion, TlsParams};
pub use transport::{TlsConnector, TlsTransport};
pub use verify::{verify_hostname, NameAttribute, PeerCertificate, COMMON_NAME, ORGANIZATION_NAME};
