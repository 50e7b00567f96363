//! Frame type registry for resolving type octets.
//!
//! The registry maps frame type octets to constructors. It is built once
//! through [`FrameTypeRegistryBuilder`] at a single call site and is
//! read-only afterwards; codecs share it behind an `Arc`.
//!
//! # Example
//!
//! ```
//! use amqp_wire::protocol::{frame_type, Frame, FrameTypeRegistry};
//!
//! let registry = FrameTypeRegistry::builder()
//!     .register(frame_type::METHOD, "method", Frame::from_parts)?
//!     .register(frame_type::HEARTBEAT, "heartbeat", Frame::from_parts)?
//!     .build();
//!
//! assert!(registry.contains(frame_type::METHOD));
//! assert!(!registry.contains(frame_type::BODY));
//! # Ok::<(), amqp_wire::WireError>(())
//! ```

use std::collections::HashMap;

use bytes::Bytes;

use super::frame::Frame;
use super::wire_format::{frame_type, FrameHeader};
use crate::error::{Result, WireError};

/// Builds a frame from a validated header and its payload.
pub type FrameConstructor = fn(FrameHeader, Bytes) -> Frame;

/// Entry for a registered frame type.
#[derive(Debug, Clone, Copy)]
pub struct FrameTypeEntry {
    /// Human-readable name, used in logs.
    pub name: &'static str,
    /// Constructor invoked for each decoded frame of this type.
    pub construct: FrameConstructor,
}

/// Read-only mapping from type octet to constructor.
#[derive(Debug, Clone)]
pub struct FrameTypeRegistry {
    entries: HashMap<u8, FrameTypeEntry>,
}

impl FrameTypeRegistry {
    /// Start building a registry.
    pub fn builder() -> FrameTypeRegistryBuilder {
        FrameTypeRegistryBuilder::new()
    }

    /// Registry with the four AMQP 0-9-1 frame types.
    pub fn amqp() -> Self {
        let mut entries = HashMap::with_capacity(4);
        for (octet, name) in [
            (frame_type::METHOD, "method"),
            (frame_type::HEADER, "header"),
            (frame_type::BODY, "body"),
            (frame_type::HEARTBEAT, "heartbeat"),
        ] {
            entries.insert(
                octet,
                FrameTypeEntry {
                    name,
                    construct: Frame::from_parts,
                },
            );
        }
        Self { entries }
    }

    /// Look up a type octet.
    #[inline]
    pub fn get(&self, octet: u8) -> Option<&FrameTypeEntry> {
        self.entries.get(&octet)
    }

    /// Check whether a type octet is registered.
    #[inline]
    pub fn contains(&self, octet: u8) -> bool {
        self.entries.contains_key(&octet)
    }

    /// Get the name registered for a type octet.
    pub fn name(&self, octet: u8) -> Option<&'static str> {
        self.entries.get(&octet).map(|entry| entry.name)
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for FrameTypeRegistry {
    fn default() -> Self {
        Self::amqp()
    }
}

/// Builder for [`FrameTypeRegistry`].
#[derive(Debug, Default)]
pub struct FrameTypeRegistryBuilder {
    entries: HashMap<u8, FrameTypeEntry>,
}

impl FrameTypeRegistryBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register a frame type.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateFrameType` if the octet is already registered.
    pub fn register(
        mut self,
        octet: u8,
        name: &'static str,
        construct: FrameConstructor,
    ) -> Result<Self> {
        if self.entries.contains_key(&octet) {
            return Err(WireError::DuplicateFrameType(octet));
        }
        self.entries
            .insert(octet, FrameTypeEntry { name, construct });
        Ok(self)
    }

    /// Freeze the registry.
    pub fn build(self) -> FrameTypeRegistry {
        FrameTypeRegistry {
            entries: self.entries,
        }
    }
}
