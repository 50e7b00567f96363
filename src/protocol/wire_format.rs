//! Wire format encoding and decoding.
//!
//! Implements the AMQP 0-9-1 frame envelope:
//! ```text
//! ┌────────┬──────────┬──────────┬──────────────┬────────┐
//! │ Type   │ Channel  │ Size     │ Payload      │ Footer │
//! │ 1 byte │ 2 bytes  │ 4 bytes  │ Size bytes   │ 0xCE   │
//! │        │ uint16 BE│ uint32 BE│              │        │
//! └────────┴──────────┴──────────┴──────────────┴────────┘
//! ```
//!
//! All multi-byte integers are Big Endian.

/// Header size in bytes (type + channel + size).
pub const HEADER_SIZE: usize = 7;

/// Footer size in bytes.
pub const FOOTER_SIZE: usize = 1;

/// Envelope bytes around a payload.
pub const FRAME_OVERHEAD: usize = HEADER_SIZE + FOOTER_SIZE;

/// Frame end marker.
pub const FRAME_END: u8 = 0xCE;

/// Connection-global channel.
pub const CONNECTION_CHANNEL: u16 = 0;

/// Default maximum payload size: any size the envelope can express.
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = u32::MAX;

/// Frame type octets defined by AMQP 0-9-1.
pub mod frame_type {
    /// Method frame.
    pub const METHOD: u8 = 1;
    /// Content header frame.
    pub const HEADER: u8 = 2;
    /// Content body frame.
    pub const BODY: u8 = 3;
    /// Heartbeat frame.
    pub const HEARTBEAT: u8 = 8;
}

/// Decoded frame header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Frame type octet, resolved through the registry.
    pub frame_type: u8,
    /// Channel (0 = connection-global).
    pub channel: u16,
    /// Declared payload length in bytes.
    pub size: u32,
}

impl FrameHeader {
    /// Create a new header.
    pub fn new(frame_type: u8, channel: u16, size: u32) -> Self {
        Self {
            frame_type,
            channel,
            size,
        }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use amqp_wire::protocol::{frame_type, FrameHeader};
    ///
    /// let header = FrameHeader::new(frame_type::METHOD, 1, 100);
    /// let bytes = header.encode();
    /// assert_eq!(bytes, [1, 0, 1, 0, 0, 0, 100]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = self.frame_type;
        buf[1..3].copy_from_slice(&self.channel.to_be_bytes());
        buf[3..7].copy_from_slice(&self.size.to_be_bytes());
        buf
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            frame_type: buf[0],
            channel: u16::from_be_bytes([buf[1], buf[2]]),
            size: u32::from_be_bytes([buf[3], buf[4], buf[5], buf[6]]),
        })
    }

    /// Total bytes on the wire for this frame, or `None` if that does not fit
    /// in `usize` on this platform.
    #[inline]
    pub fn frame_len(&self) -> Option<usize> {
        usize::try_from(self.size)
            .ok()
            .and_then(|size| size.checked_add(FRAME_OVERHEAD))
    }

    /// Check if this header is on the connection-global channel.
    #[inline]
    pub fn is_connection_global(&self) -> bool {
        self.channel == CONNECTION_CHANNEL
    }
}
