//! Transport configuration.

use std::time::Duration;

use serde::{Deserialize, Deserializer};

/// Default read size per socket receive (64KB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration shared by the plain and TLS transports.
///
/// Deserializes from the application's config with timeouts in
/// milliseconds:
///
/// ```
/// # use amqp_wire::transport::TransportConfig;
/// let config: TransportConfig =
///     serde_json::from_str(r#"{ "connect_timeout_ms": 2500, "nodelay": false }"#).unwrap();
/// assert_eq!(config.connect_timeout, Some(std::time::Duration::from_millis(2500)));
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Bytes reserved for each socket receive.
    pub read_buffer_size: usize,
    /// Set TCP_NODELAY on plain TCP sockets.
    pub nodelay: bool,
    /// Deadline for TCP connect plus any handshake.
    #[serde(rename = "connect_timeout_ms", deserialize_with = "millis")]
    pub connect_timeout: Option<Duration>,
    /// Deadline for each `write`.
    #[serde(rename = "write_timeout_ms", deserialize_with = "millis")]
    pub write_timeout: Option<Duration>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            nodelay: true,
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            write_timeout: None,
        }
    }
}

impl TransportConfig {
    /// Set the read size.
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Enable or disable TCP_NODELAY.
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    /// Set the connect deadline (`None` waits indefinitely).
    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the write deadline (`None` waits indefinitely).
    pub fn write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }
}

fn millis<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
}
