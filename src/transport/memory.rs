//! In-process transport driven by the caller.
//!
//! [`MemoryConnector`] records every transport the session creates as a
//! [`MemoryPeer`]. The peer plays the server side: it opens, delivers
//! frames, closes or fails the transport, and exposes the frames the
//! session transmitted.
//!
//! # Example
//!
//! ```ignore
//! let connector = MemoryConnector::new();
//! let session = Session::builder("ws://server")
//!     .connector(connector.clone())
//!     .store(|_action: serde_json::Value| {})
//!     .build()?;
//!
//! session.connect("/app")?;
//! let peer = connector.last().expect("transport created");
//! peer.open();
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::trace;
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::TransportId;
use crate::protocol::{Inbound, Outbound};

use super::{Connector, Transport, TransportEvents};

// ============================================================================
// MemoryConnector
// ============================================================================

/// Connector that creates [`MemoryPeer`]-backed transports.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    peers: Arc<Mutex<Vec<MemoryPeer>>>,
}

impl MemoryConnector {
    /// Creates a connector with no recorded transports.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every transport created so far, oldest first.
    #[must_use]
    pub fn peers(&self) -> Vec<MemoryPeer> {
        self.peers.lock().clone()
    }

    /// Returns the most recently created transport.
    #[must_use]
    pub fn last(&self) -> Option<MemoryPeer> {
        self.peers.lock().last().cloned()
    }

    /// Returns how many transports were created.
    #[inline]
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.peers.lock().len()
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, url: &Url, events: TransportEvents) -> Box<dyn Transport> {
        let shared = Arc::new(PeerShared {
            sent: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });

        trace!(transport = %events.id(), %url, "Memory transport created");

        self.peers.lock().push(MemoryPeer {
            url: url.clone(),
            events,
            shared: Arc::clone(&shared),
        });

        Box::new(MemoryTransport { shared })
    }
}

// ============================================================================
// MemoryPeer
// ============================================================================

/// State shared between a peer and its transport.
#[derive(Debug)]
struct PeerShared {
    /// Frames transmitted by the session.
    sent: Mutex<Vec<String>>,
    /// Whether either side closed the channel.
    closed: AtomicBool,
}

/// Server side of one memory transport.
#[derive(Debug, Clone)]
pub struct MemoryPeer {
    url: Url,
    events: TransportEvents,
    shared: Arc<PeerShared>,
}

impl MemoryPeer {
    /// Returns the URL the transport was bound to.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the transport id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> TransportId {
        self.events.id()
    }

    /// Opens the channel.
    pub fn open(&self) {
        self.events.opened();
    }

    /// Delivers a raw frame to the session.
    pub fn deliver(&self, frame: impl Into<String>) {
        self.events.message(frame);
    }

    /// Delivers a packet encoded as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the packet cannot be serialized.
    pub fn deliver_packet(&self, packet: &Inbound) -> Result<()> {
        let frame = serde_json::to_string(packet)?;
        self.events.message(frame);
        Ok(())
    }

    /// Closes the channel from the server side.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        self.events.closed();
    }

    /// Fails the channel with `detail`.
    pub fn fail(&self, detail: impl Into<String>) {
        self.shared.closed.store(true, Ordering::Release);
        self.events.failed(detail);
    }

    /// Returns `true` once either side closed the channel.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Returns the frames transmitted so far.
    #[must_use]
    pub fn sent(&self) -> Vec<String> {
        self.shared.sent.lock().clone()
    }

    /// Returns the transmitted frames decoded as JSON packets.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if a frame is not an outbound packet.
    pub fn sent_packets(&self) -> Result<Vec<Outbound>> {
        self.shared
            .sent
            .lock()
            .iter()
            .map(|frame| serde_json::from_str(frame).map_err(Error::from))
            .collect()
    }
}

// ============================================================================
// MemoryTransport
// ============================================================================

/// Client side of one memory transport.
struct MemoryTransport {
    shared: Arc<PeerShared>,
}

impl Transport for MemoryTransport {
    fn send(&self, frame: String) -> Result<()> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(Error::transport("memory transport closed"));
        }

        self.shared.sent.lock().push(frame);
        Ok(())
    }

    fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
    }
}

// ============================================================================
// Tests
// ============================================================================
