//! Transport layer.
//!
//! A transport is one physical, single-use duplex channel bound to one URL.
//! The session creates transports through a [`Connector`] and owns them
//! exclusively; transports report their lifecycle back through the
//! [`TransportEvents`] handle they were created with.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐   Connector::connect   ┌──────────────────┐
//! │     Session     │───────────────────────►│    Transport     │
//! │                 │   Transport::send      │  (one per epoch) │
//! │  reaction under │───────────────────────►│                  │
//! │  state lock     │◄───────────────────────│  TransportEvents │
//! └─────────────────┘ open/message/close/err └──────────────────┘
//! ```
//!
//! Every event carries the [`TransportId`] of the transport that produced
//! it, so events from a superseded transport are recognised and dropped.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `memory` | In-process transport driven by the caller |
//! | `websocket` | WebSocket transport and event loop |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Weak;

use tracing::trace;
use url::Url;

use crate::error::Result;
use crate::identifiers::TransportId;

// ============================================================================
// Submodules
// ============================================================================

/// In-process transport for tests and embedding.
pub mod memory;

/// WebSocket transport.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use memory::{MemoryConnector, MemoryPeer};
pub use websocket::WsConnector;

// ============================================================================
// Traits
// ============================================================================

/// Creates transports bound to a URL.
///
/// Implementations return immediately; establishment is reported later
/// through `events`. They must not call `events` synchronously from
/// `connect`, since the session may be mid-reaction.
pub trait Connector: Send + Sync + 'static {
    /// Creates a transport for `url`.
    fn connect(&self, url: &Url, events: TransportEvents) -> Box<dyn Transport>;
}

/// One physical duplex channel.
pub trait Transport: Send + Sync {
    /// Queues a frame for transmission.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel is already gone.
    fn send(&self, frame: String) -> Result<()>;

    /// Closes the channel. Idempotent.
    fn close(&self);
}

/// Receives lifecycle events from transports.
pub trait TransportObserver: Send + Sync {
    /// Reacts to one event from transport `id`.
    fn on_transport_event(&self, id: TransportId, event: TransportEvent);
}

// ============================================================================
// TransportEvent
// ============================================================================

/// Lifecycle event reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Channel is open.
    Open,
    /// Text frame received.
    Message(String),
    /// Channel closed.
    Close,
    /// Channel failed with the given detail.
    Error(String),
}

// ============================================================================
// TransportEvents
// ============================================================================

/// Handle a transport uses to report its lifecycle.
///
/// Holds the observer weakly: once the session is gone, events are dropped.
#[derive(Clone)]
pub struct TransportEvents {
    id: TransportId,
    observer: Weak<dyn TransportObserver>,
}

impl fmt::Debug for TransportEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportEvents")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl TransportEvents {
    /// Creates a handle for transport `id`.
    #[inline]
    #[must_use]
    pub fn new(id: TransportId, observer: Weak<dyn TransportObserver>) -> Self {
        Self { id, observer }
    }

    /// Returns the transport id events are tagged with.
    #[inline]
    #[must_use]
    pub fn id(&self) -> TransportId {
        self.id
    }

    /// Reports an event.
    pub fn emit(&self, event: TransportEvent) {
        match self.observer.upgrade() {
            Some(observer) => observer.on_transport_event(self.id, event),
            None => trace!(transport = %self.id, ?event, "Observer gone, event dropped"),
        }
    }

    /// Reports that the channel opened.
    #[inline]
    pub fn opened(&self) {
        self.emit(TransportEvent::Open);
    }

    /// Reports a received text frame.
    #[inline]
    pub fn message(&self, frame: impl Into<String>) {
        self.emit(TransportEvent::Message(frame.into()));
    }

    /// Reports that the channel closed.
    #[inline]
    pub fn closed(&self) {
        self.emit(TransportEvent::Close);
    }

    /// Reports a channel failure.
    #[inline]
    pub fn failed(&self, detail: impl Into<String>) {
        self.emit(TransportEvent::Error(detail.into()));
    }
}

// ============================================================================
// Tests
// ============================================================================
