//! Error types for amqp-wire.

use thiserror::Error;

/// Main error type for framing, transport and TLS operations.
///
/// Incomplete frames and read timeouts are not errors: they surface as
/// `Ok(None)` (or frames left in the buffer) so the hot read path never
/// builds an error value.
#[derive(Debug, Error)]
pub enum WireError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The byte after a payload was not the `0xCE` frame end marker.
    #[error(
        "framing error, unexpected byte {byte:#04x}: frame type {frame_type:#04x}, channel {channel}, payload size {size}"
    )]
    MissingFooter {
        /// The byte found where the footer should be.
        byte: u8,
        /// Declared frame type.
        frame_type: u8,
        /// Declared channel.
        channel: u16,
        /// Declared payload size.
        size: u32,
    },

    /// The frame type octet is not registered.
    #[error("unknown frame type {0:#04x}")]
    InvalidFrameType(u8),

    /// Declared payload size exceeds the codec limit.
    #[error("payload size {size} exceeds maximum {max}")]
    FrameTooLarge {
        /// Declared payload size.
        size: u32,
        /// Configured maximum.
        max: u32,
    },

    /// A payload longer than the 32-bit size field can describe.
    #[error("payload of {len} bytes does not fit a frame")]
    PayloadTooLong {
        /// Payload length in bytes.
        len: usize,
    },

    /// A frame type octet was registered twice.
    #[error("frame type {0:#04x} is already registered")]
    DuplicateFrameType(u8),

    /// The requested scheduler backend name is not one we know.
    #[error("unsupported transport backend '{0}'")]
    UnsupportedBackend(String),

    /// The requested backend is known but cannot run here.
    #[error("transport backend '{backend}' is unavailable: {reason}")]
    BackendUnavailable {
        /// Backend name.
        backend: &'static str,
        /// Why it cannot be used.
        reason: String,
    },

    /// TLS configuration error.
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    /// Certificate loading or parsing error.
    #[error("certificate error: {0}")]
    Certificate(String),

    /// Private key loading or parsing error.
    #[error("private key error: {0}")]
    PrivateKey(String),

    /// TLS handshake failed.
    #[error("TLS handshake error: {0}")]
    Handshake(String),

    /// The peer certificate does not name the host we connected to.
    #[error("incorrect hostname supplied by the certificate, was looking for {0}")]
    InvalidHostname(String),

    /// Connection closed by the peer.
    #[error("connection closed")]
    ConnectionClosed,

    /// A bounded operation that has no sentinel form timed out.
    #[error("operation timed out: {operation}")]
    Timeout {
        /// The operation that timed out.
        operation: &'static str,
    },
}

impl WireError {
    /// True for errors that mean the byte stream is corrupt or the peer speaks
    /// an incompatible protocol. The connection must be torn down.
    pub fn is_fatal_protocol(&self) -> bool {
        matches!(
            self,
            WireError::MissingFooter { .. }
                | WireError::InvalidFrameType(_)
                | WireError::FrameTooLarge { .. }
        )
    }

    /// True when the session must not be trusted.
    pub fn is_security(&self) -> bool {
        matches!(self, WireError::InvalidHostname(_))
    }
}

/// Result type alias using WireError.
pub type Result<T> = std::result::Result<T, WireError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_footer_message_has_context() {
        let err = WireError::MissingFooter {
            byte: 0xAB,
            frame_type: 1,
            channel: 7,
            size: 12,
        };
        let msg = err.to_string();
        assert!(msg.contains("0xab"));
        assert!(msg.contains("0x01"));
        assert!(msg.contains("channel 7"));
        assert!(msg.contains("payload size 12"));
        assert!(err.is_fatal_protocol());
        assert!(!err.is_security());
    }

    #[test]
    fn test_invalid_hostname_is_security() {
        let err = WireError::InvalidHostname("example.com".into());
        assert!(err.is_security());
        assert!(!err.is_fatal_protocol());
        assert!(err.to_string().contains("example.com"));
    }
}
