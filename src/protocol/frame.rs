//! Frame struct with typed accessors.
//!
//! Represents a complete protocol frame with header and payload.
//! Uses `bytes::Bytes` for zero-copy payload sharing.
//!
//! # Example
//!
//! ```
//! use amqp_wire::protocol::{frame_type, Frame};
//! use bytes::Bytes;
//!
//! let frame = Frame::new(frame_type::BODY, 1, Bytes::from_static(b"hello"));
//!
//! assert_eq!(frame.channel(), 1);
//! assert_eq!(frame.size(), 5);
//! assert_eq!(frame.payload(), b"hello");
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::wire_format::{frame_type, FrameHeader, FRAME_END, FRAME_OVERHEAD};
use crate::error::{Result, WireError};

/// Size field for a payload of `len` bytes.
fn payload_size(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| WireError::PayloadTooLong { len })
}

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame header. `size` may be zero for frames built before their payload
    /// length was known; see [`Frame::size`].
    pub header: FrameHeader,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame whose declared size is the payload length.
    ///
    /// A payload beyond `u32::MAX` bytes cannot be framed; such a frame is
    /// rejected by [`Frame::check_encodable`] and by the transports'
    /// `write_frame`. Use [`Frame::try_new`] to fail here instead.
    pub fn new(frame_type: u8, channel: u16, payload: Bytes) -> Self {
        let size = payload_size(payload.len()).unwrap_or(u32::MAX);
        Self {
            header: FrameHeader::new(frame_type, channel, size),
            payload,
        }
    }

    /// Create a frame, failing with `PayloadTooLong` if the payload does not
    /// fit the size field.
    pub fn try_new(frame_type: u8, channel: u16, payload: Bytes) -> Result<Self> {
        let size = payload_size(payload.len())?;
        Ok(Self {
            header: FrameHeader::new(frame_type, channel, size),
            payload,
        })
    }

    /// Create a frame from header and payload.
    ///
    /// This is the default registry constructor.
    pub fn from_parts(header: FrameHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Heartbeat frame. Always on channel 0 with an empty payload.
    pub fn heartbeat() -> Self {
        Self::new(frame_type::HEARTBEAT, 0, Bytes::new())
    }

    /// Get the frame type octet.
    #[inline]
    pub fn frame_type(&self) -> u8 {
        self.header.frame_type
    }

    /// Get the channel.
    #[inline]
    pub fn channel(&self) -> u16 {
        self.header.channel
    }

    /// Declared payload size.
    ///
    /// A zero declared size with a non-empty payload reports the payload
    /// length, so a frame can be built before its size is known.
    #[inline]
    pub fn size(&self) -> u32 {
        if self.header.size == 0 && !self.payload.is_empty() {
            return payload_size(self.payload.len()).unwrap_or(u32::MAX);
        }
        self.header.size
    }

    /// Check that the payload length fits the size field.
    ///
    /// [`Frame::encode`] does not check; a frame that fails here would be
    /// written with a saturated size.
    pub fn check_encodable(&self) -> Result<()> {
        payload_size(self.payload.len()).map(|_| ())
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get a clone of the payload as Bytes (cheap, zero-copy).
    #[inline]
    pub fn payload_bytes(&self) -> Bytes {
        self.payload.clone()
    }

    /// Check if this is a heartbeat.
    #[inline]
    pub fn is_heartbeat(&self) -> bool {
        self.header.frame_type == frame_type::HEARTBEAT
    }

    /// Number of bytes [`Frame::encode`] produces.
    #[inline]
    pub fn encoded_len(&self) -> usize {
        FRAME_OVERHEAD + self.size() as usize
    }

    /// Encode into a contiguous byte buffer:
    /// `[type][channel][size][payload][0xCE]`.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Append the encoded frame to `dst`.
    pub fn encode_into(&self, dst: &mut BytesMut) {
        let header = FrameHeader::new(self.header.frame_type, self.header.channel, self.size());
        dst.reserve(self.encoded_len());
        dst.put_slice(&header.encode());
        dst.put_slice(&self.payload);
        dst.put_u8(FRAME_END);
    }
}

/// Encode a frame as a single byte buffer (standalone function).
#[inline]
pub fn encode_frame(frame: &Frame) -> Bytes {
    frame.encode()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::wire_format::HEADER_SIZE;

    #[test]
    fn test_frame_creation() {
        let frame = Frame::new(frame_type::METHOD, 3, Bytes::from_static(b"hello"));

        assert_eq!(frame.frame_type(), frame_type::METHOD);
        assert_eq!(frame.channel(), 3);
        assert_eq!(frame.size(), 5);
        assert_eq!(frame.payload(), b"hello");
    }

    #[test]
    fn test_encode_layout() {
        let frame = Frame::new(frame_type::BODY, 0x0102, Bytes::from_static(b"abc"));
        let bytes = frame.encode();

        assert_eq!(&bytes[..HEADER_SIZE], &[3, 0x01, 0x02, 0, 0, 0, 3]);
        assert_eq!(&bytes[HEADER_SIZE..HEADER_SIZE + 3], b"abc");
        assert_eq!(bytes[bytes.len() - 1], FRAME_END);
        assert_eq!(bytes.len(), frame.encoded_len());
    }

    #[test]
    fn test_zero_size_is_inferred_from_payload() {
        let frame = Frame::from_parts(
            FrameHeader::new(frame_type::BODY, 1, 0),
            Bytes::from_static(b"data"),
        );
        assert_eq!(frame.size(), 4);

        let bytes = frame.encode();
        assert_eq!(&bytes[3..7], &4u32.to_be_bytes());
        assert_eq!(bytes.len(), FRAME_OVERHEAD + 4);
    }

    #[test]
    fn test_payload_size_bounds() {
        assert_eq!(payload_size(0).unwrap(), 0);
        assert_eq!(payload_size(u32::MAX as usize).unwrap(), u32::MAX);

        #[cfg(target_pointer_width = "64")]
        {
            let len = u32::MAX as usize + 1;
            let err = payload_size(len).unwrap_err();
            assert!(matches!(err, WireError::PayloadTooLong { len: l } if l == len));
        }
    }

    #[test]
    fn test_try_new_and_check_encodable() {
        let frame = Frame::try_new(frame_type::BODY, 2, Bytes::from_static(b"abc")).unwrap();
        assert_eq!(frame.size(), 3);
        frame.check_encodable().unwrap();
        Frame::heartbeat().check_encodable().unwrap();
    }

    #[test]
    fn test_heartbeat_encoding() {
        let bytes = Frame::heartbeat().encode();
        assert_eq!(&bytes[..], &[8, 0, 0, 0, 0, 0, 0, 0xCE]);
        assert!(Frame::heartbeat().is_heartbeat());
    }

    #[test]
    fn test_encode_into_appends() {
        let mut buf = BytesMut::from(&b"xx"[..]);
        Frame::heartbeat().encode_into(&mut buf);
        assert_eq!(buf.len(), 2 + FRAME_OVERHEAD);
        assert_eq!(&buf[..2], b"xx");
    }

    #[test]
    fn test_payload_bytes_zero_copy() {
        let original = Bytes::from_static(b"test data");
        let frame = Frame::new(frame_type::BODY, 1, original.clone());

        let cloned = frame.payload_bytes();
        assert_eq!(cloned, original);
        assert_eq!(cloned.as_ptr(), original.as_ptr());
    }
}
