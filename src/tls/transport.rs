//! TLS connector and transport.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

use super::params::TlsParams;
use super::verify::PeerCertificate;
use crate::error::{Result, WireError};
use crate::protocol::{Frame, FrameCodec};
use crate::transport::{
    open_stream, Backend, Connector, LockedTransport, SocketTransport, TcpConnector, Transport,
    TransportConfig,
};

/// Opens TCP connections and completes the TLS handshake on them.
///
/// Everything that can be rejected up front (backend name, scheduler,
/// certificate files, cipher list) is checked in [`TlsConnector::initialize`].
#[derive(Clone)]
pub struct TlsConnector {
    inner: tokio_rustls::TlsConnector,
    server_hostname: Option<String>,
    backend: Backend,
    config: TransportConfig,
}

impl std::fmt::Debug for TlsConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConnector")
            .field("server_hostname", &self.server_hostname)
            .field("backend", &self.backend)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TlsConnector {
    /// Select the backend by name and build the client configuration.
    ///
    /// Must be called from within the runtime the backend names.
    ///
    /// # Errors
    ///
    /// `UnsupportedBackend` for an unknown name, `BackendUnavailable` when
    /// the caller runs on another scheduler, and the errors of
    /// [`TlsParams::client_config`].
    pub fn initialize(backend_name: &str, params: &TlsParams) -> Result<Self> {
        let backend: Backend = backend_name.parse()?;
        backend.ensure_available()?;

        let client_config = params.client_config()?;
        tracing::debug!(
            backend = backend.name(),
            cert_reqs = ?params.cert_reqs,
            "tls connector initialized"
        );

        Ok(Self {
            inner: tokio_rustls::TlsConnector::from(Arc::new(client_config)),
            server_hostname: params.server_hostname.clone(),
            backend,
            config: TransportConfig::default(),
        })
    }

    /// Replace the transport configuration.
    pub fn with_config(mut self, config: TransportConfig) -> Self {
        self.config = config;
        self
    }

    /// Selected backend.
    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Transport configuration used by connections from this connector.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    fn server_name(&self, addr: &str) -> Result<ServerName<'static>> {
        let name = match &self.server_hostname {
            Some(name) => name.clone(),
            None => host_part(addr).to_string(),
        };
        ServerName::try_from(name.clone())
            .map_err(|_| WireError::TlsConfig(format!("invalid server name '{name}'")))
    }
}

impl Connector for TlsConnector {
    type Stream = TlsStream<TcpStream>;

    async fn connect(&self, addr: &str) -> Result<Self::Stream> {
        let server_name = self.server_name(addr)?;
        let tcp = TcpConnector::new(self.config.nodelay).connect(addr).await?;

        let connector = self.inner.clone();
        let handshake = async move {
            connector
                .connect(server_name, tcp)
                .await
                .map_err(|e| WireError::Handshake(e.to_string()))
        };
        let stream = self.backend.drive(handshake).await?;

        let (_, session) = stream.get_ref();
        tracing::debug!(
            addr,
            version = ?session.protocol_version(),
            cipher = ?session.negotiated_cipher_suite().map(|s| s.suite()),
            "tls handshake complete"
        );
        Ok(stream)
    }
}

/// `host` out of `host:port`, `[v6]:port` or a bare host.
fn host_part(addr: &str) -> &str {
    if let Some(rest) = addr.strip_prefix('[') {
        return rest.split_once(']').map_or(rest, |(host, _)| host);
    }
    match addr.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') && port.parse::<u16>().is_ok() => host,
        _ => addr,
    }
}

/// Treat the timeout errors an encrypted stream can surface like the plain
/// transport's read timeout.
fn is_read_timeout(err: &WireError) -> bool {
    matches!(
        err,
        WireError::Io(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
    )
}

/// Shared transport over a TLS session.
pub struct TlsTransport {
    inner: LockedTransport<TlsStream<TcpStream>>,
    peer: Option<PeerCertificate>,
}

impl TlsTransport {
    /// Connect and complete the handshake before returning.
    ///
    /// The connect timeout covers TCP connect and handshake together.
    pub async fn connect(connector: &TlsConnector, addr: &str) -> Result<Self> {
        let stream = open_stream(connector, addr, &connector.config).await?;

        let peer = match stream.get_ref().1.peer_certificates() {
            Some([leaf, ..]) => Some(PeerCertificate::from_der(leaf)?),
            _ => None,
        };

        let transport = SocketTransport::new(stream, &connector.config);
        Ok(Self {
            inner: LockedTransport::new(transport),
            peer,
        })
    }

    /// Connect, then check the peer certificate against `expected`.
    ///
    /// On mismatch the session is closed and `InvalidHostname` returned.
    pub async fn connect_verified(
        connector: &TlsConnector,
        addr: &str,
        expected: &str,
    ) -> Result<Self> {
        let transport = Self::connect(connector, addr).await?;
        if let Err(e) = transport.verify_hostname(expected) {
            if let Err(close_err) = transport.close().await {
                tracing::debug!(error = %close_err, "close after failed verification");
            }
            return Err(e);
        }
        Ok(transport)
    }

    /// Check the peer certificate subject against `expected`.
    ///
    /// A session without a peer certificate fails like an empty subject.
    pub fn verify_hostname(&self, expected: &str) -> Result<()> {
        let subject = self.peer.as_ref().map_or(&[][..], |p| &p.subject[..]);
        super::verify::verify_hostname(subject, expected)
    }

    /// Certificate presented by the server, if any.
    pub fn peer_certificate(&self) -> Option<&PeerCertificate> {
        self.peer.as_ref()
    }

    /// See [`LockedTransport::read`].
    pub async fn read(&self, timeout: Option<Duration>) -> Result<Option<BytesMut>> {
        match self.inner.read(timeout).await {
            Err(e) if is_read_timeout(&e) => Ok(None),
            other => other,
        }
    }

    /// See [`LockedTransport::read_frames`].
    pub async fn read_frames(
        &self,
        codec: &FrameCodec,
        timeout: Option<Duration>,
    ) -> Result<Vec<Frame>> {
        match self.inner.read_frames(codec, timeout).await {
            Err(e) if is_read_timeout(&e) => Ok(Vec::new()),
            other => other,
        }
    }

    /// See [`LockedTransport::buffer`].
    pub async fn buffer(&self, data: &[u8]) {
        self.inner.buffer(data).await;
    }

    /// See [`LockedTransport::write`].
    pub async fn write(&self, data: &[u8]) -> Result<()> {
        self.inner.write(data).await
    }

    /// Encode and write one frame.
    pub async fn write_frame(&self, frame: &Frame) -> Result<()> {
        self.inner.write_frame(frame).await
    }

    /// Send close_notify and shut down the write side.
    pub async fn close(&self) -> Result<()> {
        self.inner.close().await
    }
}

impl Transport for &TlsTransport {
    async fn read(&mut self, timeout: Option<Duration>) -> Result<Option<BytesMut>> {
        TlsTransport::read(*self, timeout).await
    }

    async fn buffer(&mut self, data: &[u8]) {
        TlsTransport::buffer(*self, data).await
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        TlsTransport::write(*self, data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::CertRequirement;

    fn insecure() -> TlsParams {
        TlsParams::new().cert_reqs(CertRequirement::None)
    }

    #[test]
    fn test_host_part() {
        assert_eq!(host_part("broker.internal:5671"), "broker.internal");
        assert_eq!(host_part("broker.internal"), "broker.internal");
        assert_eq!(host_part("127.0.0.1:5671"), "127.0.0.1");
        assert_eq!(host_part("[::1]:5671"), "::1");
        assert_eq!(host_part("::1"), "::1");
    }

    #[test]
    fn test_read_timeout_classification() {
        let timed_out = WireError::Io(io::Error::new(io::ErrorKind::TimedOut, "read timed out"));
        let reset = WireError::Io(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert!(is_read_timeout(&timed_out));
        assert!(!is_read_timeout(&reset));
        assert!(!is_read_timeout(&WireError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_initialize_unknown_backend() {
        let err = TlsConnector::initialize("eventlet", &insecure()).unwrap_err();
        assert!(matches!(err, WireError::UnsupportedBackend(ref name) if name == "eventlet"));
    }

    #[tokio::test]
    async fn test_initialize_wrong_scheduler() {
        let err = TlsConnector::initialize("tokio", &insecure()).unwrap_err();
        assert!(matches!(err, WireError::BackendUnavailable { backend: "tokio", .. }));
    }

    #[tokio::test]
    async fn test_initialize_rejects_bad_params_before_io() {
        let err = TlsConnector::initialize("tokio-current-thread", &TlsParams::new()).unwrap_err();
        assert!(matches!(err, WireError::TlsConfig(_)));
    }

    #[tokio::test]
    async fn test_server_name_defaults_to_host() {
        let connector = TlsConnector::initialize("tokio-current-thread", &insecure()).unwrap();
        assert_eq!(connector.backend(), Backend::TokioCurrentThread);
        let name = connector.server_name("broker.internal:5671").unwrap();
        assert!(matches!(name, ServerName::DnsName(ref d) if d.as_ref() == "broker.internal"));

        let connector = TlsConnector::initialize(
            "tokio-current-thread",
            &insecure().server_hostname("sni.example"),
        )
        .unwrap();
        let name = connector.server_name("10.0.0.1:5671").unwrap();
        assert!(matches!(name, ServerName::DnsName(ref d) if d.as_ref() == "sni.example"));

        let connector = TlsConnector::initialize("tokio-current-thread", &insecure()).unwrap();
        let name = connector.server_name("10.0.0.1:5671").unwrap();
        assert!(matches!(name, ServerName::IpAddress(_)));
    }

    #[tokio::test]
    async fn test_connect_refused_is_io_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let connector = TlsConnector::initialize("tokio-current-thread", &insecure()).unwrap();
        let result = TlsTransport::connect(&connector, &addr).await;
        assert!(matches!(result, Err(WireError::Io(_))));
    }

    /// Server that accepts and never answers the ClientHello. Reports
    /// whether the client closed the socket within `within`.
    async fn silent_server(within: Duration) -> (String, tokio::task::JoinHandle<bool>) {
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let closed = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let drained = tokio::time::timeout(within, async {
                loop {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(_) => continue,
                    }
                }
            })
            .await;
            drained.is_ok()
        });
        (addr, closed)
    }

    async fn assert_stalled_handshake_released(backend: &str) {
        let (addr, closed) = silent_server(Duration::from_secs(2)).await;
        let connector = TlsConnector::initialize(backend, &insecure())
            .unwrap()
            .with_config(
                TransportConfig::default().connect_timeout(Some(Duration::from_millis(100))),
            );

        let result = TlsTransport::connect(&connector, &addr).await;
        assert!(matches!(
            result,
            Err(WireError::Timeout {
                operation: "connect"
            })
        ));
        assert!(closed.await.unwrap(), "socket left open after connect timeout");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stalled_handshake_closed_on_timeout_multi_thread() {
        assert_stalled_handshake_released("tokio").await;
    }

    #[tokio::test]
    async fn test_stalled_handshake_closed_on_timeout_current_thread() {
        assert_stalled_handshake_released("tokio-current-thread").await;
    }
}
