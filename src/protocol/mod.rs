//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the AMQP frame envelope:
//! - 7-byte header plus `0xCE` footer encoding/decoding
//! - Frame type registry
//! - Codec that extracts complete frames and leaves partial ones buffered

mod codec;
mod frame;
mod registry;
mod wire_format;

pub use codec::FrameCodec;
pub use frame::{encode_frame, Frame};
pub use registry::{FrameConstructor, FrameTypeEntry, FrameTypeRegistry, FrameTypeRegistryBuilder};
pub use wire_format::{
    frame_type, FrameHeader, CONNECTION_CHANNEL, DEFAULT_MAX_PAYLOAD_SIZE, FOOTER_SIZE, FRAME_END,
    FRAME_OVERHEAD, HEADER_SIZE,
};
