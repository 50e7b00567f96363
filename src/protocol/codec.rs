//! Frame codec for extracting frames from accumulated reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management. Complete frames
//! are split off the front of the buffer; a trailing partial frame stays
//! in place, starting at offset 0, until more bytes arrive.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use amqp_wire::protocol::{frame_type, Frame, FrameCodec, FrameTypeRegistry};
//! use bytes::{Bytes, BytesMut};
//!
//! let codec = FrameCodec::new(Arc::new(FrameTypeRegistry::amqp()));
//! let encoded = Frame::new(frame_type::BODY, 1, Bytes::from_static(b"hi")).encode();
//!
//! let mut buffer = BytesMut::from(&encoded[..4]);
//! assert!(codec.decode_all(&mut buffer)?.is_empty());
//! assert_eq!(buffer.len(), 4);
//!
//! buffer.extend_from_slice(&encoded[4..]);
//! let frames = codec.decode_all(&mut buffer)?;
//! assert_eq!(frames[0].payload(), b"hi");
//! # Ok::<(), amqp_wire::WireError>(())
//! ```

use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use super::frame::Frame;
use super::registry::{FrameTypeEntry, FrameTypeRegistry};
use super::wire_format::{FrameHeader, DEFAULT_MAX_PAYLOAD_SIZE, FRAME_END, HEADER_SIZE};
use crate::error::{Result, WireError};

/// Stateless frame decoder/encoder bound to a frame type registry.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    /// Registered frame types.
    registry: Arc<FrameTypeRegistry>,
    /// Maximum allowed payload size.
    max_payload_size: u32,
}

impl FrameCodec {
    /// Create a codec with no payload limit beyond the envelope's own.
    pub fn new(registry: Arc<FrameTypeRegistry>) -> Self {
        Self {
            registry,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }

    /// Codec over the standard AMQP 0-9-1 frame types.
    pub fn amqp() -> Self {
        Self::new(Arc::new(FrameTypeRegistry::amqp()))
    }

    /// Limit payload size, typically to the negotiated `frame_max`.
    pub fn with_max_payload(mut self, max_payload_size: u32) -> Self {
        self.max_payload_size = max_payload_size;
        self
    }

    /// Get the registry.
    pub fn registry(&self) -> &FrameTypeRegistry {
        &self.registry
    }

    /// Get the payload limit.
    pub fn max_payload_size(&self) -> u32 {
        self.max_payload_size
    }

    /// Validate the frame at the start of `buf` without consuming anything.
    ///
    /// Returns:
    /// - `Ok(Some(..))` if a complete, valid frame is present
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` on a protocol violation
    fn peek(&self, buf: &[u8]) -> Result<Option<(FrameHeader, usize, &FrameTypeEntry)>> {
        let Some(header) = FrameHeader::decode(buf) else {
            return Ok(None);
        };

        if header.size > self.max_payload_size {
            return Err(WireError::FrameTooLarge {
                size: header.size,
                max: self.max_payload_size,
            });
        }

        let frame_len = header.frame_len().ok_or(WireError::FrameTooLarge {
            size: header.size,
            max: self.max_payload_size,
        })?;

        // Payload or footer byte still in flight.
        if buf.len() < frame_len {
            return Ok(None);
        }

        let footer = buf[frame_len - 1];
        if footer != FRAME_END {
            tracing::warn!(
                byte = footer,
                frame_type = header.frame_type,
                channel = header.channel,
                size = header.size,
                "framing error"
            );
            return Err(WireError::MissingFooter {
                byte: footer,
                frame_type: header.frame_type,
                channel: header.channel,
                size: header.size,
            });
        }

        let entry = self
            .registry
            .get(header.frame_type)
            .ok_or(WireError::InvalidFrameType(header.frame_type))?;

        Ok(Some((header, frame_len, entry)))
    }

    /// Decode one frame from the start of `buf`.
    ///
    /// On success returns the frame and the number of bytes it occupied.
    /// Returns `Ok(None)` without consuming anything when the frame is
    /// incomplete; the caller keeps its cursor at the frame start.
    ///
    /// # Errors
    ///
    /// `MissingFooter`, `InvalidFrameType` and `FrameTooLarge` are fatal for
    /// the connection.
    pub fn decode(&self, buf: &[u8]) -> Result<Option<(Frame, usize)>> {
        let Some((header, frame_len, entry)) = self.peek(buf)? else {
            return Ok(None);
        };
        let payload = Bytes::copy_from_slice(&buf[HEADER_SIZE..frame_len - 1]);
        Ok(Some(((entry.construct)(header, payload), frame_len)))
    }

    /// Decode every complete frame at the front of `buf`.
    ///
    /// Consumed frames are split off; any trailing partial frame is left in
    /// `buf` starting at offset 0. Errors propagate immediately.
    pub fn decode_all(&self, buf: &mut BytesMut) -> Result<Vec<Frame>> {
        let mut frames = Vec::new();

        while let Some((header, frame_len, entry)) = self.peek(buf)? {
            let construct = entry.construct;
            let raw = buf.split_to(frame_len).freeze();
            let payload = raw.slice(HEADER_SIZE..frame_len - 1);
            frames.push(construct(header, payload));
        }

        Ok(frames)
    }

    /// Encode a frame.
    #[inline]
    pub fn encode(&self, frame: &Frame) -> Bytes {
        frame.encode()
    }
}
