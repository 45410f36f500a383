//! Wire codec between packets and text frames.
//!
//! The session never touches frame bytes directly: it encodes outbound
//! packets and hands inbound frames to the codec, then dispatches the
//! decoded [`Inbound`] packet.

// ============================================================================
// Imports
// ============================================================================

use serde_json::{from_str, to_string};

use crate::error::Result;

use super::{Inbound, Outbound};

// ============================================================================
// Codec
// ============================================================================

/// Converts packets to and from transmittable frames.
pub trait Codec: Send + Sync + 'static {
    /// Encodes an outbound packet into a frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the packet cannot be serialized.
    fn encode(&self, packet: &Outbound) -> Result<String>;

    /// Decodes a frame into an inbound packet.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a known packet.
    fn decode(&self, frame: &str) -> Result<Inbound>;
}

// ============================================================================
// JsonCodec
// ============================================================================

/// JSON codec using `type`-tagged objects.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    #[inline]
    fn encode(&self, packet: &Outbound) -> Result<String> {
        Ok(to_string(packet)?)
    }

    #[inline]
    fn decode(&self, frame: &str) -> Result<Inbound> {
        Ok(from_str(frame)?)
    }
}

// ============================================================================
// Tests
// ============================================================================
