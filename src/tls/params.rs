//! TLS parameters and client configuration.
//!
//! [`TlsParams`] carries the settings an application puts in its broker
//! config. [`TlsParams::client_config`] turns them into a rustls
//! `ClientConfig`, reading any certificate files; every failure here happens
//! before a socket is opened.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::crypto::ring;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore, SupportedCipherSuite, SupportedProtocolVersion};
use serde::Deserialize;

use super::danger::NoVerification;
use crate::error::{Result, WireError};

/// How much the server certificate is checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertRequirement {
    /// Accept any certificate.
    None,
    /// Validate against `ca_certs` when given, otherwise accept any.
    Optional,
    /// Validate against `ca_certs`, which must be given.
    #[default]
    Required,
}

/// TLS protocol version pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVersion {
    /// TLS 1.2 only.
    Tls12,
    /// TLS 1.3 only.
    Tls13,
}

/// TLS session parameters.
///
/// Field names follow the broker configuration keys:
///
/// ```
/// # use amqp_wire::tls::{CertRequirement, TlsParams};
/// let params: TlsParams = serde_json::from_str(
///     r#"{ "ca_certs": "/etc/amqp/ca.pem", "server_hostname": "broker.internal" }"#,
/// ).unwrap();
/// assert_eq!(params.cert_reqs, CertRequirement::Required);
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TlsParams {
    /// PEM private key for client authentication. Defaults to `certfile`.
    pub keyfile: Option<PathBuf>,
    /// PEM client certificate chain.
    pub certfile: Option<PathBuf>,
    /// Server certificate checking.
    pub cert_reqs: CertRequirement,
    /// Pin a protocol version; `None` allows TLS 1.2 and 1.3.
    pub protocol_version: Option<ProtocolVersion>,
    /// PEM bundle of trusted CA certificates.
    pub ca_certs: Option<PathBuf>,
    /// Colon-separated cipher suite names, e.g.
    /// `TLS13_AES_256_GCM_SHA384:TLS13_CHACHA20_POLY1305_SHA256`.
    pub ciphers: Option<String>,
    /// SNI name; defaults to the host part of the connect address.
    pub server_hostname: Option<String>,
}

impl TlsParams {
    /// Parameters with defaults (`cert_reqs = required`).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the client private key file.
    pub fn keyfile(mut self, path: impl Into<PathBuf>) -> Self {
        self.keyfile = Some(path.into());
        self
    }

    /// Set the client certificate file.
    pub fn certfile(mut self, path: impl Into<PathBuf>) -> Self {
        self.certfile = Some(path.into());
        self
    }

    /// Set certificate checking.
    pub fn cert_reqs(mut self, cert_reqs: CertRequirement) -> Self {
        self.cert_reqs = cert_reqs;
        self
    }

    /// Pin a protocol version.
    pub fn protocol_version(mut self, version: ProtocolVersion) -> Self {
        self.protocol_version = Some(version);
        self
    }

    /// Set the trusted CA bundle.
    pub fn ca_certs(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_certs = Some(path.into());
        self
    }

    /// Restrict cipher suites.
    pub fn ciphers(mut self, ciphers: impl Into<String>) -> Self {
        self.ciphers = Some(ciphers.into());
        self
    }

    /// Set the SNI name.
    pub fn server_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.server_hostname = Some(hostname.into());
        self
    }

    /// Build the rustls client configuration.
    ///
    /// # Errors
    ///
    /// `TlsConfig` for inconsistent settings, `Certificate`/`PrivateKey`
    /// for unreadable or malformed files.
    pub fn client_config(&self) -> Result<ClientConfig> {
        let mut provider = ring::default_provider();
        if let Some(ciphers) = &self.ciphers {
            provider.cipher_suites = select_cipher_suites(&provider.cipher_suites, ciphers)?;
        }
        let provider = Arc::new(provider);

        let versions: &[&'static SupportedProtocolVersion] = match self.protocol_version {
            Some(ProtocolVersion::Tls12) => &[&rustls::version::TLS12],
            Some(ProtocolVersion::Tls13) => &[&rustls::version::TLS13],
            None => rustls::ALL_VERSIONS,
        };

        let builder = ClientConfig::builder_with_provider(provider.clone())
            .with_protocol_versions(versions)
            .map_err(|e| WireError::TlsConfig(format!("protocol version error: {e}")))?;

        let builder = match (self.cert_reqs, &self.ca_certs) {
            (CertRequirement::None, _) | (CertRequirement::Optional, None) => builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerification::new(provider))),
            (_, Some(ca_certs)) => builder.with_root_certificates(load_root_store(ca_certs)?),
            (CertRequirement::Required, None) => {
                return Err(WireError::TlsConfig(
                    "cert_reqs=required needs ca_certs".to_string(),
                ));
            }
        };

        match (&self.certfile, &self.keyfile) {
            (Some(certfile), keyfile) => {
                let chain = load_certificates(certfile)?;
                let key = load_private_key(keyfile.as_deref().unwrap_or(certfile))?;
                builder
                    .with_client_auth_cert(chain, key)
                    .map_err(|e| WireError::TlsConfig(format!("client certificate error: {e}")))
            }
            (None, Some(_)) => Err(WireError::TlsConfig(
                "keyfile given without certfile".to_string(),
            )),
            (None, None) => Ok(builder.with_no_client_auth()),
        }
    }
}

/// Keep the provider's suites named in `list`, in provider order.
fn select_cipher_suites(
    available: &[SupportedCipherSuite],
    list: &str,
) -> Result<Vec<SupportedCipherSuite>> {
    let wanted: Vec<&str> = list
        .split(':')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .collect();

    let selected: Vec<SupportedCipherSuite> = available
        .iter()
        .filter(|suite| {
            let name = format!("{:?}", suite.suite());
            wanted.iter().any(|w| w.eq_ignore_ascii_case(&name))
        })
        .copied()
        .collect();

    if selected.is_empty() {
        return Err(WireError::TlsConfig(format!(
            "no supported cipher suites in '{list}'"
        )));
    }
    Ok(selected)
}

fn open_pem(path: &Path) -> std::io::Result<BufReader<File>> {
    File::open(path).map(BufReader::new)
}

/// Parse PEM-encoded certificates.
fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = open_pem(path)
        .map_err(|e| WireError::Certificate(format!("failed to read {}: {e}", path.display())))?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| {
            WireError::Certificate(format!(
                "failed to parse certificates in {}: {e}",
                path.display()
            ))
        })?;
    if certs.is_empty() {
        return Err(WireError::Certificate(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

/// Parse the first PEM-encoded private key.
fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let mut reader = open_pem(path)
        .map_err(|e| WireError::PrivateKey(format!("failed to read {}: {e}", path.display())))?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| {
            WireError::PrivateKey(format!(
                "failed to parse private key in {}: {e}",
                path.display()
            ))
        })?
        .ok_or_else(|| WireError::PrivateKey(format!("no private key found in {}", path.display())))
}

fn load_root_store(path: &Path) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    for cert in load_certificates(path)? {
        roots.add(cert).map_err(|e| {
            WireError::Certificate(format!("failed to add CA certificate: {e}"))
        })?;
    }
    Ok(roots)
}

/// Cipher suite names the default provider offers.
pub fn supported_cipher_suites() -> Vec<String> {
    let provider: CryptoProvider = ring::default_provider();
    provider
        .cipher_suites
        .iter()
        .map(|suite| format!("{:?}", suite.suite()))
        .collect()
}
